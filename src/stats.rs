//! Rig stats snapshots.
//!
//! Captures `show stats` output at startup and stores it in the `stats`
//! document under the epoch-seconds timestamp of the capture. Only the
//! newest `keep` snapshots are retained; older ones are pruned after each
//! capture so the document stays bounded under cron.
//!
//! The output is `key: value` lines. A line without a key continues the
//! previous key, turning its value into a list:
//!
//! ```text
//! hash: 30.1 29.8
//! miner: claymore
//! fanrpm: 2100
//!         2200
//! ```
//! becomes `{"hash": "30.1 29.8", "miner": "claymore", "fanrpm": ["2100", "2200"]}`.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::storage::KeyValueStore;
use crate::types::GruveError;

/// Parse `show stats` output into a JSON object, keys in output order.
pub fn parse_stats(output: &str) -> Map<String, Value> {
    let mut stats = Map::new();
    let mut previous_key: Option<String> = None;

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let keyed = line
            .split_once(": ")
            .filter(|(k, _)| !k.trim().is_empty());

        match keyed {
            Some((key, val)) => {
                let key = key.trim().to_string();
                stats.insert(key.clone(), json!(val.trim()));
                previous_key = Some(key);
            }
            None => {
                let Some(key) = previous_key.as_deref() else {
                    continue;
                };
                let extra = json!(line.trim());
                match stats.get_mut(key) {
                    Some(Value::Array(items)) => items.push(extra),
                    Some(existing) => {
                        let first = existing.take();
                        *existing = Value::Array(vec![first, extra]);
                    }
                    None => {}
                }
            }
        }
    }

    stats
}

pub struct StatsGatherer {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    command: PathBuf,
    keep: usize,
}

impl StatsGatherer {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        command: impl Into<PathBuf>,
        keep: usize,
    ) -> Self {
        Self {
            store,
            clock,
            command: command.into(),
            keep: keep.max(1),
        }
    }

    /// Run the stats command and store one snapshot. Returns the key used.
    pub async fn gather(&self) -> Result<String> {
        let output = tokio::process::Command::new(&self.command)
            .arg("stats")
            .output()
            .await
            .with_context(|| format!("Failed to run {} stats", self.command.display()))?;

        let text = String::from_utf8_lossy(&output.stdout);
        self.record(&text)
    }

    /// Store a snapshot parsed from already-captured output.
    pub fn record(&self, output: &str) -> Result<String> {
        let stats = parse_stats(output);
        let key = self.clock.epoch_secs().to_string();
        debug!(fields = stats.len(), "Stats parsed");

        self.store
            .set(&key, Value::Object(stats))
            .context("Failed to store stats snapshot")?;
        info!(key = %key, "Stats snapshot stored");

        self.prune().context("Failed to prune stats snapshots")?;
        Ok(key)
    }

    /// Drop all but the newest `keep` snapshots. Keys that are not
    /// timestamps are left alone.
    fn prune(&self) -> Result<usize, GruveError> {
        let mut stamps: Vec<(i64, String)> = self
            .store
            .keys()?
            .into_iter()
            .filter_map(|k| k.parse::<i64>().ok().map(|t| (t, k)))
            .collect();
        if stamps.len() <= self.keep {
            return Ok(0);
        }

        stamps.sort_unstable();
        let excess = stamps.len() - self.keep;
        let stale: Vec<String> = stamps.into_iter().take(excess).map(|(_, k)| k).collect();
        let removed = self.store.remove(&stale)?;
        debug!(removed, keep = self.keep, "Old stats snapshots pruned");
        Ok(removed)
    }
}
