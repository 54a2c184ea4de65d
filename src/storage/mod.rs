//! Persistence layer.
//!
//! Named JSON documents (`settings`, `stats`, `cache`) holding
//! key → value pairs. Each document is one file under the data directory
//! and is re-read on every access, so separate invocations of the switcher
//! observe each other's writes. Writes go through `update`, which holds an
//! exclusive file lock across the whole read-modify-write; the switch lock
//! is built on it.

pub mod memory;

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::GruveError;

pub use memory::MemoryStore;

/// Document names used by the switcher.
pub const SETTINGS_DOCUMENT: &str = "settings";
pub const STATS_DOCUMENT: &str = "stats";
pub const CACHE_DOCUMENT: &str = "cache";

/// Abstraction over a persistent key-value document.
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value; `None` if the key was never set.
    fn get(&self, key: &str) -> Result<Option<Value>, GruveError>;

    /// Insert or overwrite a value.
    fn set(&self, key: &str, value: Value) -> Result<(), GruveError> {
        let mut value = Some(value);
        self.update(key, &mut |_| value.take())?;
        Ok(())
    }

    /// Read-modify-write one key, atomic with respect to every other writer
    /// of the document. `f` sees the current value and returns the
    /// replacement, or `None` to leave the document untouched. Returns the
    /// value written, if any.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&Value>) -> Option<Value>,
    ) -> Result<Option<Value>, GruveError>;

    /// Every key, in document order.
    fn keys(&self) -> Result<Vec<String>, GruveError>;

    /// Delete `keys` in one write; missing keys are ignored. Returns how
    /// many were removed.
    fn remove(&self, keys: &[String]) -> Result<usize, GruveError>;

    /// Document name for logging.
    fn name(&self) -> &str;
}

/// Read a value and deserialize it. A value of the wrong shape is an error,
/// a missing or `null` value is `None`.
pub fn get_typed<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, GruveError> {
    match store.get(key)? {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v).map(Some).map_err(|e| GruveError::Storage {
            document: store.name().to_string(),
            message: format!("key {key}: {e}"),
        }),
    }
}

/// Serialize and store a value.
pub fn set_typed<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), GruveError> {
    let v = serde_json::to_value(value).map_err(|e| GruveError::Storage {
        document: store.name().to_string(),
        message: format!("key {key}: {e}"),
    })?;
    store.set(key, v)
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// A document persisted as a single pretty-printed JSON object on disk.
///
/// Every access takes an OS lock on `<name>.json.lock` (shared for reads,
/// exclusive for writes), so separate processes and separate handles in one
/// process never interleave a read-modify-write.
pub struct JsonFileStore {
    name: String,
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    /// Open (or lazily create) `<dir>/<name>.json`.
    pub fn open(dir: &Path, name: &str) -> Result<Self, GruveError> {
        std::fs::create_dir_all(dir).map_err(|e| GruveError::Storage {
            document: name.to_string(),
            message: format!("Failed to create {}: {e}", dir.display()),
        })?;
        let path = dir.join(format!("{name}.json"));
        let lock_path = dir.join(format!("{name}.json.lock"));
        info!(document = name, path = %path.display(), "Store opened");
        Ok(Self {
            name: name.to_string(),
            path,
            lock_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_err(&self, message: String) -> GruveError {
        GruveError::Storage {
            document: self.name.clone(),
            message,
        }
    }

    /// Run `f` while holding the document's file lock.
    fn locked<T>(
        &self,
        exclusive: bool,
        f: impl FnOnce() -> Result<T, GruveError>,
    ) -> Result<T, GruveError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| {
                self.storage_err(format!("Failed to open {}: {e}", self.lock_path.display()))
            })?;

        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|e| {
            self.storage_err(format!("Failed to lock {}: {e}", self.lock_path.display()))
        })?;

        let out = f();
        // Closing the handle drops the lock as well.
        let _ = FileExt::unlock(&file);
        out
    }

    fn load(&self) -> Result<Map<String, Value>, GruveError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let json = std::fs::read_to_string(&self.path)
            .map_err(|e| self.storage_err(format!("Failed to read {}: {e}", self.path.display())))?;
        if json.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&json)
            .map_err(|e| self.storage_err(format!("Failed to parse {}: {e}", self.path.display())))
    }

    fn save(&self, doc: &Map<String, Value>) -> Result<(), GruveError> {
        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| self.storage_err(format!("Failed to serialise document: {e}")))?;

        // Write-then-rename so a reader never sees a half-written file.
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        std::fs::write(&tmp, json)
            .map_err(|e| self.storage_err(format!("Failed to write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            self.storage_err(format!("Failed to replace {}: {e}", self.path.display()))
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, GruveError> {
        self.locked(false, || Ok(self.load()?.get(key).cloned()))
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&Value>) -> Option<Value>,
    ) -> Result<Option<Value>, GruveError> {
        self.locked(true, || {
            let mut doc = self.load()?;
            let Some(value) = f(doc.get(key)) else {
                return Ok(None);
            };
            doc.insert(key.to_string(), value.clone());
            self.save(&doc)?;
            debug!(document = %self.name, key, "Value stored");
            Ok(Some(value))
        })
    }

    fn keys(&self) -> Result<Vec<String>, GruveError> {
        self.locked(false, || Ok(self.load()?.keys().cloned().collect()))
    }

    fn remove(&self, keys: &[String]) -> Result<usize, GruveError> {
        self.locked(true, || {
            let mut doc = self.load()?;
            let removed = keys
                .iter()
                .filter(|k| doc.shift_remove(k.as_str()).is_some())
                .count();
            if removed > 0 {
                self.save(&doc)?;
                debug!(document = %self.name, removed, "Values removed");
            }
            Ok(removed)
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
