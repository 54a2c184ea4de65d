//! Switch executor.
//!
//! Writes the merged miner configuration, restarts the miner through the
//! `ProcessControl` seam and records the new coin. On ethOS the restart is
//! `disallow` → `minestop` → `allow`, with a settling pause between steps
//! so the old miner has exited before new jobs are allowed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config_gen::{generate_config, render_local_conf};
use crate::clock::Clock;
use crate::config::MinerConfig;
use crate::settings::Settings;
use crate::types::{Coin, GruveError};

// ---------------------------------------------------------------------------
// Process control
// ---------------------------------------------------------------------------

/// Control over the external mining process manager.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Stop handing out new jobs.
    async fn disallow(&self) -> Result<(), GruveError>;
    /// Stop the running miner.
    async fn stop(&self) -> Result<(), GruveError>;
    /// Resume handing out jobs (the miner restarts with the new config).
    async fn allow(&self) -> Result<(), GruveError>;
}

/// ethOS command-line adapter.
pub struct EthosProcessControl {
    bin_dir: PathBuf,
}

impl EthosProcessControl {
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
        }
    }

    async fn run(&self, command: &str) -> Result<(), GruveError> {
        let path = self.bin_dir.join(command);
        let output = tokio::process::Command::new(&path)
            .output()
            .await
            .map_err(|e| GruveError::ProcessControl {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        debug!(
            command,
            status = %output.status,
            output = %String::from_utf8_lossy(&output.stdout).trim(),
            "Process control command finished"
        );
        Ok(())
    }
}

#[async_trait]
impl ProcessControl for EthosProcessControl {
    async fn disallow(&self) -> Result<(), GruveError> {
        self.run("disallow").await
    }

    async fn stop(&self) -> Result<(), GruveError> {
        self.run("minestop").await
    }

    async fn allow(&self) -> Result<(), GruveError> {
        self.run("allow").await
    }
}

/// Logs the restart sequence without touching any process.
pub struct DryRunProcessControl;

#[async_trait]
impl ProcessControl for DryRunProcessControl {
    async fn disallow(&self) -> Result<(), GruveError> {
        info!("[DRY RUN] Would disallow new jobs");
        Ok(())
    }

    async fn stop(&self) -> Result<(), GruveError> {
        info!("[DRY RUN] Would stop miner");
        Ok(())
    }

    async fn allow(&self) -> Result<(), GruveError> {
        info!("[DRY RUN] Would allow new jobs");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct SwitchExecutor {
    miner_config: Arc<MinerConfig>,
    settings: Settings,
    process: Arc<dyn ProcessControl>,
    clock: Arc<dyn Clock>,
    local_conf_path: PathBuf,
    settle_delay: Duration,
}

impl SwitchExecutor {
    pub fn new(
        miner_config: Arc<MinerConfig>,
        settings: Settings,
        process: Arc<dyn ProcessControl>,
        clock: Arc<dyn Clock>,
        local_conf_path: PathBuf,
        settle_delay: Duration,
    ) -> Self {
        Self {
            miner_config,
            settings,
            process,
            clock,
            local_conf_path,
            settle_delay,
        }
    }

    /// Switch the rig to `coin`.
    pub async fn switch_to_coin(&self, coin: &Coin) -> Result<()> {
        let merged = generate_config(&self.miner_config, coin);
        let text = render_local_conf(&merged);

        if let Some(parent) = self.local_conf_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&self.local_conf_path, &text)
            .await
            .with_context(|| format!("Failed to write {}", self.local_conf_path.display()))?;
        info!(
            coin = %coin.tag,
            path = %self.local_conf_path.display(),
            lines = merged.len(),
            "Miner configuration written"
        );

        self.restart_miner().await;

        self.settings
            .set_current_coin(coin)
            .context("Failed to record current coin")?;
        self.settings
            .set_last_switch(self.clock.epoch_secs())
            .context("Failed to record switch time")?;

        Ok(())
    }

    /// Fire-and-forget restart: failures are logged, the sequence continues.
    async fn restart_miner(&self) {
        if let Err(e) = self.process.disallow().await {
            warn!(error = %e, "disallow failed");
        }
        tokio::time::sleep(self.settle_delay).await;

        if let Err(e) = self.process.stop().await {
            warn!(error = %e, "miner stop failed");
        }
        tokio::time::sleep(self.settle_delay).await;

        if let Err(e) = self.process.allow().await {
            warn!(error = %e, "allow failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
