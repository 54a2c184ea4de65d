//! In-memory rig for integration testing.
//!
//! Provides deterministic `FeedSource`, `ProcessControl` and `Notifier`
//! implementations plus a builder that wires a full `DecisionEngine`
//! around them: no network, no processes, simulated time.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gruve::cache::Cache;
use gruve::clock::{Clock, ManualClock};
use gruve::config::MinerConfig;
use gruve::engine::executor::{ProcessControl, SwitchExecutor};
use gruve::engine::lock::SwitchLock;
use gruve::engine::DecisionEngine;
use gruve::feed::{FeedSource, ProfitabilityFetcher};
use gruve::notify::Notifier;
use gruve::settings::{self, Settings};
use gruve::storage::{KeyValueStore, MemoryStore};
use gruve::types::GruveError;

pub const FEED_URL: &str = "https://whattomine.com/coins.json?eth=true&zec=true";
pub const START: i64 = 1_700_000_000;

/// Feed whose coins can be re-priced between cycles.
pub struct MockFeed {
    coins: Mutex<Vec<(String, String, f64, bool)>>,
    fetches: Mutex<usize>,
    force_error: Mutex<Option<String>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self {
            coins: Mutex::new(Vec::new()),
            fetches: Mutex::new(0),
            force_error: Mutex::new(None),
        }
    }

    /// Replace the feed contents: (tag, algorithm, profitability, lagging).
    pub fn set(&self, coins: &[(&str, &str, f64, bool)]) {
        *self.coins.lock().unwrap() = coins
            .iter()
            .map(|(t, a, p, l)| (t.to_string(), a.to_string(), *p, *l))
            .collect();
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }

    fn document(&self) -> Value {
        let mut coins = Map::new();
        for (tag, algorithm, profitability, lagging) in self.coins.lock().unwrap().iter() {
            coins.insert(
                format!("{tag} coin"),
                // WhatToMine sends some numbers as strings.
                json!({
                    "tag": tag,
                    "algorithm": algorithm,
                    "profitability": profitability.to_string(),
                    "lagging": lagging,
                    "block_time": "15.0"
                }),
            );
        }
        json!({ "coins": coins })
    }
}

#[async_trait]
impl FeedSource for MockFeed {
    async fn fetch(&self, url: &str) -> Result<Value, GruveError> {
        *self.fetches.lock().unwrap() += 1;
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(GruveError::FeedFetch {
                url: url.to_string(),
                message: msg,
            });
        }
        Ok(self.document())
    }
}

/// Records process-control calls in order.
#[derive(Default)]
pub struct RecordingProcess {
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingProcess {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessControl for RecordingProcess {
    async fn disallow(&self) -> Result<(), GruveError> {
        self.calls.lock().unwrap().push("disallow");
        Ok(())
    }

    async fn stop(&self) -> Result<(), GruveError> {
        self.calls.lock().unwrap().push("stop");
        Ok(())
    }

    async fn allow(&self) -> Result<(), GruveError> {
        self.calls.lock().unwrap().push("allow");
        Ok(())
    }
}

/// Collects notification texts.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// A fully wired engine over in-memory collaborators.
pub struct MockRig {
    pub engine: DecisionEngine,
    pub settings: Settings,
    pub settings_store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub feed: Arc<MockFeed>,
    pub process: Arc<RecordingProcess>,
    pub notifier: Arc<RecordingNotifier>,
    pub local_conf: PathBuf,
    work_dir: PathBuf,
}

pub const MINER_CONFIG: &str = r#"{
    "global": {"globalminer": "claymore", "maxgputemp": "85", "proxywallet": "0xabc"},
    "algorithms": {
        "ethash": {"flags": "=--cl-global-work 8192"},
        "equihash": {"globalminer": "ewbf-zcash"}
    },
    "coins": {
        "ETH": {"proxypool1": "eth.pool:4444"},
        "ETC": {"proxypool1": "etc.pool:4444", "mine_duration": 1800},
        "ZEC": {"proxypool1": "zec.pool:3333", "proxywallet": "t1zec"}
    }
}"#;

impl MockRig {
    pub fn new(lock_ttl: Option<i64>) -> Self {
        let settings_store = Arc::new(MemoryStore::new("settings"));
        let cache_store = Arc::new(MemoryStore::new("cache"));
        let clock = Arc::new(ManualClock::at_epoch_secs(START));
        let settings = Settings::new(settings_store.clone());
        settings.set_feed_url(FEED_URL).unwrap();
        settings_store.set(settings::MINE_DURATION, json!(3600)).unwrap();
        settings_store.set(settings::SWITCH_THRESHOLD, json!(25)).unwrap();
        settings_store.set(settings::CACHE_EXPIRY, json!(300)).unwrap();

        let miner_config = Arc::new(MinerConfig::from_json(MINER_CONFIG).unwrap());
        let feed = Arc::new(MockFeed::new());
        let process = Arc::new(RecordingProcess::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let clock_dyn: Arc<dyn Clock> = clock.clone();
        let cache = Cache::new(cache_store, settings.clone(), clock_dyn.clone());
        let fetcher =
            ProfitabilityFetcher::new(settings.clone(), cache, feed.clone(), miner_config.clone());

        let mut work_dir = std::env::temp_dir();
        work_dir.push(format!("gruve_it_{}", uuid::Uuid::new_v4()));
        let local_conf = work_dir.join("local.conf");

        let executor = SwitchExecutor::new(
            miner_config.clone(),
            settings.clone(),
            process.clone(),
            clock_dyn.clone(),
            local_conf.clone(),
            Duration::ZERO,
        );
        let lock = SwitchLock::new(settings_store.clone(), clock_dyn.clone(), lock_ttl);
        let engine = DecisionEngine::new(
            settings.clone(),
            lock,
            fetcher,
            executor,
            notifier.clone(),
            miner_config,
            clock_dyn,
        );

        Self {
            engine,
            settings,
            settings_store,
            clock,
            feed,
            process,
            notifier,
            local_conf,
            work_dir,
        }
    }

    pub fn current_tag(&self) -> Option<String> {
        self.settings.current_coin().unwrap().map(|c| c.tag)
    }

    pub fn lock_value(&self) -> Option<Value> {
        self.settings_store.get(settings::IS_LOCKED).unwrap()
    }
}

impl Drop for MockRig {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.work_dir);
    }
}
