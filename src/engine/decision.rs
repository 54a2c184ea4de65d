//! Decision engine.
//!
//! One evaluation cycle: take the switch lock, then apply three guards in
//! order (minimum dwell time, already on the best coin, profitability
//! margin) and switch only if all pass. The lock is released on every
//! exit path, including errors.

use anyhow::Result;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::executor::SwitchExecutor;
use super::lock::SwitchLock;
use crate::clock::Clock;
use crate::config::MinerConfig;
use crate::feed::ProfitabilityFetcher;
use crate::notify::Notifier;
use crate::settings::Settings;
use crate::types::Coin;
use crate::util::human_time;

// ---------------------------------------------------------------------------
// Decision record
// ---------------------------------------------------------------------------

/// Outcome of one evaluation, with the figures behind it.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Another evaluation holds the lock.
    LockHeld,
    /// The current coin has not been mined for its minimum duration yet.
    Dwelling {
        current: Coin,
        mined_secs: i64,
        min_secs: i64,
    },
    /// Feed unavailable, or every configured coin is lagging or missing.
    NoCandidate { current: Coin },
    /// The current coin is still the most profitable.
    AlreadyOptimal { current: Coin, mined_secs: i64 },
    /// A better coin exists but its lead is under the switch threshold.
    BelowThreshold {
        current: Coin,
        candidate: Coin,
        diff: f64,
        threshold: f64,
    },
    /// The rig switched coins.
    Switched {
        from: Coin,
        to: Coin,
        diff: f64,
        mined_secs: i64,
    },
}

impl Decision {
    pub fn is_switch(&self) -> bool {
        matches!(self, Decision::Switched { .. })
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::LockHeld => write!(f, "Skipped: evaluation already in progress"),
            Decision::Dwelling {
                current,
                mined_secs,
                min_secs,
            } => write!(
                f,
                "Mining {} for {} of at least {}",
                current.tag,
                human_time(*mined_secs),
                human_time(*min_secs)
            ),
            Decision::NoCandidate { current } => {
                write!(f, "No profitable coin found, staying on {}", current)
            }
            Decision::AlreadyOptimal {
                current,
                mined_secs,
            } => write!(
                f,
                "Mined {} for {} so far, still most profitable",
                current.tag,
                human_time(*mined_secs)
            ),
            Decision::BelowThreshold {
                current,
                candidate,
                diff,
                threshold,
            } => write!(
                f,
                "Staying on {}: {} is {:.1}% more profitable at {:.1}% (threshold {:.1}%)",
                current.tag, candidate.tag, diff, candidate.profitability, threshold
            ),
            Decision::Switched { from, to, diff, .. } => {
                write!(f, "Switched {} -> {} (+{:.1}%)", from, to.tag, diff)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct DecisionEngine {
    settings: Settings,
    lock: SwitchLock,
    fetcher: ProfitabilityFetcher,
    executor: SwitchExecutor,
    notifier: Arc<dyn Notifier>,
    miner_config: Arc<MinerConfig>,
    clock: Arc<dyn Clock>,
}

impl DecisionEngine {
    pub fn new(
        settings: Settings,
        lock: SwitchLock,
        fetcher: ProfitabilityFetcher,
        executor: SwitchExecutor,
        notifier: Arc<dyn Notifier>,
        miner_config: Arc<MinerConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            lock,
            fetcher,
            executor,
            notifier,
            miner_config,
            clock,
        }
    }

    /// Minimum dwell time for a coin: its own `mine_duration` if configured,
    /// otherwise the global setting.
    pub fn mine_duration_for(&self, tag: &str) -> Result<i64> {
        match self.miner_config.coin_mine_duration(tag) {
            Some(secs) => Ok(secs),
            None => Ok(self.settings.mine_duration()?),
        }
    }

    /// Run one cycle; `true` iff the rig switched coins.
    pub async fn evaluate_and_switch(&self) -> Result<bool> {
        Ok(self.evaluate().await?.is_switch())
    }

    /// Run one cycle and report what was decided.
    pub async fn evaluate(&self) -> Result<Decision> {
        let Some(guard) = self.lock.try_acquire()? else {
            debug!("Switch lock held, skipping evaluation");
            return Ok(Decision::LockHeld);
        };

        let outcome = self.decide().await;
        let released = guard.release();

        let decision = outcome?;
        released?;
        Ok(decision)
    }

    async fn decide(&self) -> Result<Decision> {
        let current = self.settings.current_coin()?.unwrap_or_else(Coin::none);
        let duration = self.mine_duration_for(&current.tag)?;
        let mined_secs = self.clock.epoch_secs() - self.settings.last_switch()?;

        // Guard 1: minimum dwell time.
        if mined_secs < duration {
            return Ok(Decision::Dwelling {
                current,
                mined_secs,
                min_secs: duration,
            });
        }

        let best = match self.fetcher.most_profitable_coin().await {
            Ok(Some(best)) => best,
            Ok(None) => return Ok(Decision::NoCandidate { current }),
            Err(e) if e.is_feed_unavailable() => {
                warn!(error = %e, "Profitability feed unavailable");
                return Ok(Decision::NoCandidate { current });
            }
            Err(e) => return Err(e.into()),
        };

        // Guard 2: already on the best coin.
        if best.tag == current.tag {
            return Ok(Decision::AlreadyOptimal {
                current,
                mined_secs,
            });
        }

        // Guard 3: margin must reach the threshold.
        let threshold = self.settings.switch_threshold()?;
        let diff = best.profitability - current.profitability;
        if diff < threshold {
            return Ok(Decision::BelowThreshold {
                current,
                candidate: best,
                diff,
                threshold,
            });
        }

        let new_duration = self.mine_duration_for(&best.tag)?;
        self.executor.switch_to_coin(&best).await?;

        let message = if current.is_none() {
            format!(
                "Starting on {} ({:.1}% profitability) for at least {}.",
                best.tag,
                best.profitability,
                human_time(new_duration)
            )
        } else {
            format!(
                "Mined {} for {}, switching to {} ({:.1}% more profitable) for at least {}.",
                current.tag,
                human_time(mined_secs),
                best.tag,
                diff,
                human_time(new_duration)
            )
        };
        info!(from = %current.tag, to = %best.tag, diff, "{message}");
        self.notifier.notify(&message).await;

        Ok(Decision::Switched {
            from: current,
            to: best,
            diff,
            mined_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
