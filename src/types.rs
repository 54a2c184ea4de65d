//! Shared types for the GRUVE switcher.
//!
//! The coin snapshot and the domain error enum are used by every
//! layer (feed, engine, storage), so they live here to keep the
//! module graph acyclic.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Coin
// ---------------------------------------------------------------------------

/// A mineable coin as reported by the profitability feed.
///
/// Identity is the `tag`. `profitability` and `lagging` are refreshed on
/// every feed fetch; the copy stored as `current_coin` is the snapshot
/// taken when the rig last switched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub tag: String,
    pub algorithm: String,
    /// Profitability relative to the feed's reference coin, in percent.
    pub profitability: f64,
    #[serde(default)]
    pub lagging: bool,
}

impl Coin {
    /// Stand-in for a rig that has never switched: no tag, zero profitability.
    pub fn none() -> Self {
        Self {
            tag: String::new(),
            algorithm: String::new(),
            profitability: 0.0,
            lagging: false,
        }
    }

    pub fn is_none(&self) -> bool {
        self.tag.is_empty()
    }

    /// Helper to build a test coin.
    #[cfg(test)]
    pub fn sample(tag: &str, algorithm: &str, profitability: f64) -> Self {
        Self {
            tag: tag.to_string(),
            algorithm: algorithm.to_string(),
            profitability,
            lagging: false,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "(none)");
        }
        write!(
            f,
            "{} [{}] {:.0}%{}",
            self.tag,
            self.algorithm,
            self.profitability,
            if self.lagging { " (lagging)" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for GRUVE.
#[derive(Debug, thiserror::Error)]
pub enum GruveError {
    #[error("No profitability feed URL configured")]
    FeedUrlMissing,

    #[error("Feed request failed ({url}): {message}")]
    FeedFetch { url: String, message: String },

    #[error("Feed parse error: {0}")]
    FeedParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error ({document}): {message}")]
    Storage { document: String, message: String },

    #[error("Process control error ({command}): {message}")]
    ProcessControl { command: String, message: String },
}

impl GruveError {
    /// Whether this error means "no usable feed this cycle" rather than a
    /// local fault. The engine degrades these to "no candidate".
    pub fn is_feed_unavailable(&self) -> bool {
        matches!(
            self,
            GruveError::FeedUrlMissing | GruveError::FeedFetch { .. } | GruveError::FeedParse(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
