//! Typed view over the `settings` document.
//!
//! Startup writes the tunables (from `gruve.toml` or the built-in
//! defaults); the decision engine reads them and records
//! `current_coin` / `last_switch` after each switch.

use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::SettingsConfig;
use crate::storage::{get_typed, set_typed, KeyValueStore};
use crate::types::{Coin, GruveError};

pub const MINE_DURATION: &str = "mine_duration";
pub const SWITCH_THRESHOLD: &str = "switch_threshold";
pub const CACHE_EXPIRY: &str = "cache_expiry";
pub const FEED_URL: &str = "whattomine_url";
pub const PUSHBULLET_TOKEN: &str = "pushbullet_token";
pub const PUSHOVER_TOKEN: &str = "pushover_token";
pub const PUSHOVER_USER: &str = "pushover_user";
pub const LAST_SWITCH: &str = "last_switch";
pub const CURRENT_COIN: &str = "current_coin";
pub const IS_LOCKED: &str = "is_locked";

pub const DEFAULT_MINE_DURATION: i64 = 3600;
pub const DEFAULT_SWITCH_THRESHOLD: f64 = 25.0;
pub const DEFAULT_CACHE_EXPIRY: i64 = 300;

/// Rewrite a WhatToMine page URL to its JSON endpoint.
///
/// `https://whattomine.com/coins?eth=true&...` becomes
/// `https://whattomine.com/coins.json?eth=true&...`. Anything already
/// pointing at a `.json` resource is returned unchanged.
pub fn normalize_feed_url(url: &str) -> String {
    let url = url.trim();
    if url.contains(".json") {
        url.to_string()
    } else {
        url.replace("whattomine.com/coins", "whattomine.com/coins.json")
    }
}

/// Interpret a stored scalar as a number, accepting numeric strings.
fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Interpret a stored scalar as a non-empty string.
fn value_as_nonempty_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn KeyValueStore>,
}

impl Settings {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Write the startup tunables. Every value is (re)written on each start,
    /// so editing `gruve.toml` and restarting takes effect immediately.
    /// The feed URL is only touched when one is configured and differs
    /// from the stored one.
    pub fn apply_startup(&self, cfg: &SettingsConfig) -> Result<(), GruveError> {
        self.store.set(MINE_DURATION, json!(cfg.mine_duration))?;
        self.store.set(SWITCH_THRESHOLD, json!(cfg.switch_threshold))?;
        self.store.set(CACHE_EXPIRY, json!(cfg.cache_expiry))?;

        let creds = [
            (PUSHBULLET_TOKEN, cfg.pushbullet_token_env.as_deref()),
            (PUSHOVER_TOKEN, cfg.pushover_token_env.as_deref()),
            (PUSHOVER_USER, cfg.pushover_user_env.as_deref()),
        ];
        for (key, env) in creds {
            let val = env.and_then(|e| std::env::var(e).ok()).unwrap_or_default();
            self.store.set(key, json!(val))?;
        }

        if let Some(url) = cfg.whattomine_url.as_deref().filter(|u| !u.trim().is_empty()) {
            if self.feed_url()?.as_deref() != Some(normalize_feed_url(url).as_str()) {
                self.set_feed_url(url)?;
            }
        }

        info!(
            mine_duration = cfg.mine_duration,
            switch_threshold = cfg.switch_threshold,
            cache_expiry = cfg.cache_expiry,
            "Settings applied"
        );
        Ok(())
    }

    fn number(&self, key: &str) -> Result<Option<f64>, GruveError> {
        Ok(self.store.get(key)?.as_ref().and_then(value_as_f64))
    }

    /// Global minimum dwell time in seconds.
    pub fn mine_duration(&self) -> Result<i64, GruveError> {
        Ok(self
            .number(MINE_DURATION)?
            .map(|v| v as i64)
            .unwrap_or(DEFAULT_MINE_DURATION))
    }

    /// Minimum profitability advantage (percentage points) to switch.
    pub fn switch_threshold(&self) -> Result<f64, GruveError> {
        Ok(self.number(SWITCH_THRESHOLD)?.unwrap_or(DEFAULT_SWITCH_THRESHOLD))
    }

    /// Default cache lifetime in seconds.
    pub fn cache_expiry(&self) -> Result<i64, GruveError> {
        Ok(self
            .number(CACHE_EXPIRY)?
            .map(|v| v as i64)
            .unwrap_or(DEFAULT_CACHE_EXPIRY))
    }

    pub fn feed_url(&self) -> Result<Option<String>, GruveError> {
        Ok(self.store.get(FEED_URL)?.as_ref().and_then(value_as_nonempty_string))
    }

    pub fn set_feed_url(&self, url: &str) -> Result<(), GruveError> {
        let normalized = normalize_feed_url(url);
        debug!(url = %normalized, "Feed URL stored");
        self.store.set(FEED_URL, json!(normalized))
    }

    fn secret(&self, key: &str) -> Result<Option<SecretString>, GruveError> {
        Ok(self
            .store
            .get(key)?
            .as_ref()
            .and_then(value_as_nonempty_string)
            .map(SecretString::new))
    }

    pub fn pushbullet_token(&self) -> Result<Option<SecretString>, GruveError> {
        self.secret(PUSHBULLET_TOKEN)
    }

    pub fn pushover_token(&self) -> Result<Option<SecretString>, GruveError> {
        self.secret(PUSHOVER_TOKEN)
    }

    pub fn pushover_user(&self) -> Result<Option<SecretString>, GruveError> {
        self.secret(PUSHOVER_USER)
    }

    /// Epoch seconds of the last switch; 0 if the rig never switched.
    pub fn last_switch(&self) -> Result<i64, GruveError> {
        Ok(self.number(LAST_SWITCH)?.map(|v| v as i64).unwrap_or(0))
    }

    pub fn set_last_switch(&self, secs: i64) -> Result<(), GruveError> {
        self.store.set(LAST_SWITCH, json!(secs))
    }

    pub fn current_coin(&self) -> Result<Option<Coin>, GruveError> {
        get_typed(self.store.as_ref(), CURRENT_COIN)
    }

    pub fn set_current_coin(&self, coin: &Coin) -> Result<(), GruveError> {
        set_typed(self.store.as_ref(), CURRENT_COIN, coin)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
