//! Switch lock.
//!
//! Serialises decision cycles across invocations through the `is_locked`
//! settings key. The value is a lease `{token, acquired_at, ttl_secs}`;
//! `false` (or absent) means free. A bare `true`/`1` left behind by an
//! older install counts as held forever.
//!
//! With a TTL, a lease older than its TTL is considered abandoned and can
//! be taken over. Without one, a lease left by a crashed run stays until an
//! operator resets `is_locked` to `false`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::settings::IS_LOCKED;
use crate::storage::KeyValueStore;
use crate::types::GruveError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub token: String,
    /// Epoch seconds.
    pub acquired_at: i64,
    #[serde(default)]
    pub ttl_secs: Option<i64>,
}

impl Lease {
    fn is_expired(&self, now: i64) -> bool {
        self.ttl_secs.is_some_and(|ttl| now - self.acquired_at >= ttl)
    }
}

/// What the `is_locked` key currently holds.
#[derive(Debug, Clone, PartialEq)]
pub enum LockState {
    Free,
    /// Legacy boolean flag: held, never expires.
    Flag,
    Leased(Lease),
}

impl LockState {
    fn from_value(v: Option<Value>) -> Self {
        match v {
            None | Some(Value::Null) | Some(Value::Bool(false)) => LockState::Free,
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => LockState::Free,
            Some(Value::String(s)) if s.is_empty() || s == "0" => LockState::Free,
            Some(v @ Value::Object(_)) => match serde_json::from_value::<Lease>(v) {
                Ok(lease) => LockState::Leased(lease),
                Err(_) => LockState::Flag,
            },
            Some(_) => LockState::Flag,
        }
    }
}

#[derive(Clone)]
pub struct SwitchLock {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl_secs: Option<i64>,
}

impl SwitchLock {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, ttl_secs: Option<i64>) -> Self {
        Self {
            store,
            clock,
            ttl_secs: ttl_secs.filter(|t| *t > 0),
        }
    }

    pub fn state(&self) -> Result<LockState, GruveError> {
        Ok(LockState::from_value(self.store.get(IS_LOCKED)?))
    }

    /// Whether a live (unexpired) lock is held.
    pub fn is_locked(&self) -> Result<bool, GruveError> {
        let now = self.clock.epoch_secs();
        Ok(match self.state()? {
            LockState::Free => false,
            LockState::Flag => true,
            LockState::Leased(lease) => !lease.is_expired(now),
        })
    }

    /// Take the lock, or `None` if someone else holds it.
    ///
    /// The check and the write happen in one store update, so two callers
    /// racing on the same document can never both succeed.
    pub fn try_acquire(&self) -> Result<Option<LockGuard>, GruveError> {
        let now = self.clock.epoch_secs();
        let lease = Lease {
            token: Uuid::new_v4().to_string(),
            acquired_at: now,
            ttl_secs: self.ttl_secs,
        };
        let claim = serde_json::to_value(&lease).map_err(|e| GruveError::Storage {
            document: self.store.name().to_string(),
            message: format!("key {IS_LOCKED}: {e}"),
        })?;

        let mut abandoned: Option<Lease> = None;
        let written = self.store.update(IS_LOCKED, &mut |current| {
            match LockState::from_value(current.cloned()) {
                LockState::Free => Some(claim.clone()),
                LockState::Leased(old) if old.is_expired(now) => {
                    abandoned = Some(old);
                    Some(claim.clone())
                }
                LockState::Flag | LockState::Leased(_) => None,
            }
        })?;

        if written.is_none() {
            return Ok(None);
        }
        if let Some(old) = abandoned {
            warn!(
                token = %old.token,
                held_secs = now - old.acquired_at,
                "Took over expired switch lock"
            );
        }
        debug!(token = %lease.token, "Switch lock acquired");

        Ok(Some(LockGuard {
            store: self.store.clone(),
            token: lease.token,
            released: false,
        }))
    }

    /// Operator reset: clear whatever is held.
    pub fn force_clear(&self) -> Result<(), GruveError> {
        warn!("Switch lock force-cleared");
        self.store.set(IS_LOCKED, json!(false))
    }
}

/// Held lock. Released on `release()` or, failing that, on drop, so every
/// exit path of a decision cycle clears it.
pub struct LockGuard {
    store: Arc<dyn KeyValueStore>,
    token: String,
    released: bool,
}

impl LockGuard {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn release(mut self) -> Result<(), GruveError> {
        self.released = true;
        self.clear()
    }

    fn clear(&self) -> Result<(), GruveError> {
        // Only clear our own lease; after a TTL takeover it belongs to someone else.
        let cleared = self.store.update(IS_LOCKED, &mut |current| {
            match LockState::from_value(current.cloned()) {
                LockState::Leased(lease) if lease.token == self.token => Some(json!(false)),
                _ => None,
            }
        })?;
        if cleared.is_some() {
            debug!(token = %self.token, "Switch lock released");
        } else {
            warn!(token = %self.token, "Switch lock no longer ours, left in place");
        }
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.clear() {
            error!(token = %self.token, error = %e, "Failed to release switch lock");
        }
    }
}
