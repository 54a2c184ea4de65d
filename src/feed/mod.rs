//! Profitability feed.
//!
//! Resolves the feed URL from settings, serves the feed through the
//! time-window cache, and picks the most profitable coin this rig is
//! configured to mine.
//!
//! Feed shape (WhatToMine `coins.json`):
//! `{"coins": {"<label>": {"tag", "algorithm", "profitability", "lagging", ...}}}`
//! Only those four fields are read; everything else is ignored.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::config::MinerConfig;
use crate::settings::Settings;
use crate::types::{Coin, GruveError};

pub use http::HttpFeed;

/// Source of raw feed documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch and decode the JSON document at `url`.
    async fn fetch(&self, url: &str) -> Result<Value, GruveError>;
}

// ---------------------------------------------------------------------------
// Feed schema
// ---------------------------------------------------------------------------

/// One coin entry of the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedCoin {
    pub tag: String,
    pub algorithm: String,
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub profitability: f64,
    pub lagging: bool,
}

impl From<FeedCoin> for Coin {
    fn from(c: FeedCoin) -> Self {
        Coin {
            tag: c.tag,
            algorithm: c.algorithm,
            profitability: c.profitability,
            lagging: c.lagging,
        }
    }
}

fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }

    let n = match Raw::deserialize(deserializer)? {
        Raw::Num(n) => n,
        Raw::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("non-numeric profitability: {s:?}")))?,
    };
    // `"NaN"` and `"inf"` parse as f64 but defeat every comparison.
    if !n.is_finite() {
        return Err(serde::de::Error::custom(format!(
            "non-finite profitability: {n}"
        )));
    }
    Ok(n)
}

/// Parsed feed, entries in the order the feed lists them.
#[derive(Debug, Clone, Default)]
pub struct FeedDocument {
    pub coins: Vec<(String, FeedCoin)>,
}

impl FeedDocument {
    /// Validate a raw feed document. Any malformed entry fails the whole
    /// document rather than yielding a partially populated coin.
    pub fn from_value(value: &Value) -> Result<Self, GruveError> {
        let coins = value
            .get("coins")
            .and_then(Value::as_object)
            .ok_or_else(|| GruveError::FeedParse("missing \"coins\" object".into()))?;

        let coins = coins
            .iter()
            .map(|(label, entry)| {
                FeedCoin::deserialize(entry)
                    .map(|coin| (label.clone(), coin))
                    .map_err(|e| GruveError::FeedParse(format!("coin {label:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { coins })
    }

    /// The most profitable coin that is configured locally and not lagging.
    ///
    /// Comparison is strictly greater-than in feed order, so on a tie the
    /// coin listed first wins.
    pub fn most_profitable(&self, config: &MinerConfig) -> Option<Coin> {
        let mut best: Option<&FeedCoin> = None;

        for (label, coin) in &self.coins {
            if !config.is_configured(&coin.tag) {
                continue;
            }
            if coin.lagging {
                debug!(label = %label, tag = %coin.tag, "Skipping lagging coin");
                continue;
            }
            if best.map_or(true, |b| coin.profitability > b.profitability) {
                best = Some(coin);
            }
        }

        best.cloned().map(Coin::from)
    }
}

/// Stable cache key for a feed URL.
pub fn url_cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

pub struct ProfitabilityFetcher {
    settings: Settings,
    cache: Cache,
    source: Arc<dyn FeedSource>,
    miner_config: Arc<MinerConfig>,
}

impl ProfitabilityFetcher {
    pub fn new(
        settings: Settings,
        cache: Cache,
        source: Arc<dyn FeedSource>,
        miner_config: Arc<MinerConfig>,
    ) -> Self {
        Self {
            settings,
            cache,
            source,
            miner_config,
        }
    }

    /// The current feed, from cache when fresh, otherwise fetched and cached.
    pub async fn feed(&self) -> Result<FeedDocument, GruveError> {
        let url = self.settings.feed_url()?.ok_or(GruveError::FeedUrlMissing)?;
        let key = url_cache_key(&url);

        if let Some(cached) = self.cache.get(&key)? {
            debug!(key = %key, "Feed served from cache");
            return FeedDocument::from_value(&cached);
        }

        info!(url = %url, "Fetching profitability feed");
        let fetched = self.source.fetch(&url).await?;
        // Validate before caching so a bad payload is never served later.
        FeedDocument::from_value(&fetched)?;
        self.cache.set(&key, fetched.clone(), None)?;

        // Consume the cached representation so hit and miss paths agree.
        match self.cache.get(&key)? {
            Some(cached) => FeedDocument::from_value(&cached),
            None => {
                warn!(key = %key, "Feed not readable from cache right after write");
                FeedDocument::from_value(&fetched)
            }
        }
    }

    /// Most profitable eligible coin; `Ok(None)` when nothing qualifies.
    pub async fn most_profitable_coin(&self) -> Result<Option<Coin>, GruveError> {
        let feed = self.feed().await?;
        let best = feed.most_profitable(&self.miner_config);
        match &best {
            Some(coin) => debug!(coin = %coin, feed_coins = feed.coins.len(), "Most profitable coin"),
            None => info!(feed_coins = feed.coins.len(), "No eligible coin in feed"),
        }
        Ok(best)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
