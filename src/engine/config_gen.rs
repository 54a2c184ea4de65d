//! Miner configuration generator.
//!
//! Merges the three configuration layers for a coin and renders the
//! result in ethOS `local.conf` format.

use serde_json::Value;

use crate::config::{ConfigMap, MinerConfig};
use crate::types::Coin;

/// Control key consumed by the decision engine; never written to the miner.
const MINE_DURATION_KEY: &str = "mine_duration";

/// Merge `global` ← `algorithms[lowercase(algorithm)]` ← `coins[tag]`.
///
/// Later layers overwrite same-named keys from earlier ones. Keys keep
/// the position of their first appearance. Missing layers count as empty.
pub fn generate_config(config: &MinerConfig, coin: &Coin) -> ConfigMap {
    let mut merged = config.global.clone();

    let layers = [config.algorithm(&coin.algorithm), config.coin(&coin.tag)];
    for layer in layers.into_iter().flatten() {
        for (key, val) in layer {
            merged.insert(key.clone(), val.clone());
        }
    }

    merged.shift_remove(MINE_DURATION_KEY);
    merged
}

/// Text form of a value as it appears in `local.conf`; `None` for values
/// that should be omitted: null, `false`, `""`, `"0"`, numeric zero and
/// empty lists.
fn render_value(val: &Value) -> Option<String> {
    let text = match val {
        Value::Null | Value::Bool(false) => return None,
        Value::Bool(true) => "1".to_string(),
        Value::String(s) if s == "0" => return None,
        Value::String(s) => s.clone(),
        Value::Number(n) if n.as_f64() == Some(0.0) => return None,
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(render_value)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(_) => val.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Render a merged configuration: one `key value` line per entry, CRLF
/// terminated. Values starting with `=` are appended directly
/// (`key=value` directives).
pub fn render_local_conf(config: &ConfigMap) -> String {
    let mut out = String::new();
    for (key, val) in config {
        let Some(text) = render_value(val) else {
            continue;
        };
        out.push_str(key);
        if !text.starts_with('=') {
            out.push(' ');
        }
        out.push_str(&text);
        out.push_str("\r\n");
    }
    out
}

/// Parse `local.conf` text back into `key → value` strings, splitting each
/// line at the first space.
pub fn parse_local_conf(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .map(|l| match l.split_once(' ') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (l.to_string(), String::new()),
        })
        .collect()
}
