//! Time-window cache over the `cache` document.
//!
//! Each value is wrapped in a `{timestamp, expiry, data}` envelope.
//! Staleness is checked lazily on read; stale entries are left in place
//! and simply overwritten by the next write.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::settings::Settings;
use crate::storage::{set_typed, KeyValueStore};
use crate::types::GruveError;

/// Stored envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Write time, epoch seconds.
    pub timestamp: i64,
    /// Lifetime in seconds.
    pub expiry: i64,
    pub data: Value,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: i64) -> bool {
        now - self.timestamp < self.expiry
    }
}

#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KeyValueStore>,
    settings: Settings,
    clock: Arc<dyn Clock>,
}

impl Cache {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: Settings, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            settings,
            clock,
        }
    }

    /// Store `data` under `key`. `expiry` defaults to the `cache_expiry` setting.
    pub fn set(&self, key: &str, data: Value, expiry: Option<i64>) -> Result<(), GruveError> {
        let expiry = match expiry {
            Some(e) if e > 0 => e,
            _ => self.settings.cache_expiry()?,
        };
        let entry = CacheEntry {
            timestamp: self.clock.epoch_secs(),
            expiry,
            data,
        };
        debug!(key, expiry, "Cache write");
        set_typed(self.store.as_ref(), key, &entry)
    }

    /// Fresh data for `key`, or `None` when never set or expired.
    pub fn get(&self, key: &str) -> Result<Option<Value>, GruveError> {
        // An entry that no longer parses as an envelope counts as absent;
        // the next write replaces it.
        let raw = match self.store.get(key)? {
            None | Some(Value::Null) => return Ok(None),
            Some(raw) => raw,
        };
        let entry: CacheEntry = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(key, error = %e, "Unreadable cache entry ignored");
                return Ok(None);
            }
        };

        let now = self.clock.epoch_secs();
        if entry.is_fresh(now) {
            Ok(Some(entry.data))
        } else {
            debug!(key, age = now - entry.timestamp, expiry = entry.expiry, "Cache entry stale");
            Ok(None)
        }
    }
}
