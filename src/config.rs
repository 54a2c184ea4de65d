//! Configuration loading.
//!
//! Two sources:
//! - `gruve.toml`: application settings (rig paths, scheduler cadence,
//!   switching tunables). Secrets are referenced by env-var name and
//!   resolved at startup.
//! - `<gruve_dir>/config.json`: the layered miner configuration document
//!   (`global`, `algorithms`, `coins`). Read once, never written.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::settings::{DEFAULT_CACHE_EXPIRY, DEFAULT_MINE_DURATION, DEFAULT_SWITCH_THRESHOLD};
use crate::types::GruveError;

/// One layer of miner configuration: key → value, in file order.
pub type ConfigMap = Map<String, Value>;

// ---------------------------------------------------------------------------
// Application config (gruve.toml)
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub rig: RigConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RigConfig {
    /// Name used in log lines and notifications. Defaults to the hostname.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_home_dir")]
    pub home_dir: PathBuf,
    /// Work under `./home`, log process control instead of running it,
    /// and skip the stats snapshot.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Pause between the disallow / stop / allow commands.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
    /// Lock lease lifetime. Unset keeps a stale lock until an operator
    /// clears `is_locked` by hand.
    #[serde(default)]
    pub lock_ttl_secs: Option<i64>,
    #[serde(default = "default_ethos_bin_dir")]
    pub ethos_bin_dir: PathBuf,
    /// Stats snapshots retained; the oldest are pruned past this.
    #[serde(default = "default_stats_keep")]
    pub stats_keep: usize,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            name: None,
            home_dir: default_home_dir(),
            dry_run: false,
            scan_interval_secs: default_scan_interval(),
            settle_delay_secs: default_settle_delay(),
            lock_ttl_secs: None,
            ethos_bin_dir: default_ethos_bin_dir(),
            stats_keep: default_stats_keep(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    #[serde(default = "default_mine_duration")]
    pub mine_duration: i64,
    #[serde(default = "default_switch_threshold")]
    pub switch_threshold: f64,
    #[serde(default = "default_cache_expiry")]
    pub cache_expiry: i64,
    /// WhatToMine page or JSON URL.
    #[serde(default)]
    pub whattomine_url: Option<String>,
    #[serde(default)]
    pub pushbullet_token_env: Option<String>,
    #[serde(default)]
    pub pushover_token_env: Option<String>,
    #[serde(default)]
    pub pushover_user_env: Option<String>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            mine_duration: DEFAULT_MINE_DURATION,
            switch_threshold: DEFAULT_SWITCH_THRESHOLD,
            cache_expiry: DEFAULT_CACHE_EXPIRY,
            whattomine_url: None,
            pushbullet_token_env: None,
            pushover_token_env: None,
            pushover_user_env: None,
        }
    }
}

fn default_home_dir() -> PathBuf {
    PathBuf::from("/home/ethos")
}
fn default_scan_interval() -> u64 {
    60
}
fn default_settle_delay() -> u64 {
    5
}
fn default_ethos_bin_dir() -> PathBuf {
    PathBuf::from("/opt/ethos/bin")
}
fn default_stats_keep() -> usize {
    1440
}
fn default_mine_duration() -> i64 {
    DEFAULT_MINE_DURATION
}
fn default_switch_threshold() -> f64 {
    DEFAULT_SWITCH_THRESHOLD
}
fn default_cache_expiry() -> i64 {
    DEFAULT_CACHE_EXPIRY
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Like `load`, but an absent file yields the built-in defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            info!(path, "No application config found, using defaults");
            Ok(Self::default())
        }
    }

    /// Home directory the switcher works in (`./home` for dry runs).
    pub fn home_dir(&self) -> PathBuf {
        if self.rig.dry_run {
            PathBuf::from("./home")
        } else {
            self.rig.home_dir.clone()
        }
    }

    pub fn gruve_dir(&self) -> PathBuf {
        self.home_dir().join(".gruve")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.gruve_dir().join("data")
    }

    pub fn miner_config_path(&self) -> PathBuf {
        self.gruve_dir().join("config.json")
    }

    /// The file the miner reads on restart.
    pub fn local_conf_path(&self) -> PathBuf {
        self.home_dir().join("local.conf")
    }

    /// Rig name: configured, else `$HOSTNAME`, else `/etc/hostname`.
    pub fn rig_name(&self) -> String {
        self.rig
            .name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .or_else(|| fs::read_to_string("/etc/hostname").ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "rig".to_string())
    }
}

// ---------------------------------------------------------------------------
// Miner configuration document (config.json)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawMinerConfig {
    #[serde(default)]
    global: ConfigMap,
    #[serde(default)]
    algorithms: HashMap<String, ConfigMap>,
    #[serde(default)]
    coins: HashMap<String, ConfigMap>,
}

/// Layered miner configuration: global → per-algorithm → per-coin.
#[derive(Debug, Clone, Default)]
pub struct MinerConfig {
    pub global: ConfigMap,
    /// Keyed by lowercase algorithm name.
    pub algorithms: HashMap<String, ConfigMap>,
    /// Keyed by coin tag. Only these coins are ever mined.
    pub coins: HashMap<String, ConfigMap>,
}

impl MinerConfig {
    /// Load the document. A missing, empty or unparseable document is fatal.
    pub fn load(path: &Path) -> Result<Self, GruveError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            GruveError::Config(format!(
                "No configuration file found at {}: {e}",
                path.display()
            ))
        })?;
        let cfg = Self::from_json(&contents)?;
        info!(
            path = %path.display(),
            coins = cfg.coins.len(),
            algorithms = cfg.algorithms.len(),
            "Miner configuration loaded"
        );
        Ok(cfg)
    }

    pub fn from_json(contents: &str) -> Result<Self, GruveError> {
        let raw: RawMinerConfig = serde_json::from_str(contents)
            .map_err(|e| GruveError::Config(format!("Invalid configuration document: {e}")))?;

        if raw.global.is_empty() && raw.algorithms.is_empty() && raw.coins.is_empty() {
            return Err(GruveError::Config("Configuration document is empty".into()));
        }

        Ok(Self {
            global: raw.global,
            algorithms: raw
                .algorithms
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            coins: raw.coins,
        })
    }

    pub fn is_configured(&self, tag: &str) -> bool {
        self.coins.contains_key(tag)
    }

    pub fn coin(&self, tag: &str) -> Option<&ConfigMap> {
        self.coins.get(tag)
    }

    pub fn algorithm(&self, algorithm: &str) -> Option<&ConfigMap> {
        self.algorithms.get(&algorithm.to_lowercase())
    }

    /// Per-coin `mine_duration` override, if set to a positive number.
    pub fn coin_mine_duration(&self, tag: &str) -> Option<i64> {
        let v = self.coin(tag)?.get("mine_duration")?;
        let secs = match v {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        (secs > 0.0).then_some(secs as i64)
    }
}
