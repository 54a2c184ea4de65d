//! In-memory store for tests and dry runs.

use serde_json::{Map, Value};
use std::sync::Mutex;

use super::KeyValueStore;
use crate::types::GruveError;

/// Volatile `KeyValueStore` that also records which keys were written,
/// in order, so tests can assert on side effects.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    doc: Mutex<Map<String, Value>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            doc: Mutex::new(Map::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Keys written since creation (or the last `clear_writes`), in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn clear_writes(&self) {
        if let Ok(mut w) = self.writes.lock() {
            w.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.doc.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned(&self) -> GruveError {
        GruveError::Storage {
            document: self.name.clone(),
            message: "mutex poisoned".into(),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, GruveError> {
        let doc = self.doc.lock().map_err(|_| self.poisoned())?;
        Ok(doc.get(key).cloned())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&Value>) -> Option<Value>,
    ) -> Result<Option<Value>, GruveError> {
        let mut doc = self.doc.lock().map_err(|_| self.poisoned())?;
        let Some(value) = f(doc.get(key)) else {
            return Ok(None);
        };
        doc.insert(key.to_string(), value.clone());
        self.writes
            .lock()
            .map_err(|_| self.poisoned())?
            .push(key.to_string());
        Ok(Some(value))
    }

    fn keys(&self) -> Result<Vec<String>, GruveError> {
        let doc = self.doc.lock().map_err(|_| self.poisoned())?;
        Ok(doc.keys().cloned().collect())
    }

    fn remove(&self, keys: &[String]) -> Result<usize, GruveError> {
        let mut doc = self.doc.lock().map_err(|_| self.poisoned())?;
        Ok(keys
            .iter()
            .filter(|k| doc.shift_remove(k.as_str()).is_some())
            .count())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
