//! GRUVE: single-rig profit switcher.
//!
//! Entry point. Loads configuration, initialises logging, opens the
//! settings/stats/cache stores, and either runs one evaluation (for cron)
//! or evaluates on a fixed interval until Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

use gruve::cache::Cache;
use gruve::clock::{Clock, SystemClock};
use gruve::config::{AppConfig, MinerConfig};
use gruve::engine::executor::{
    DryRunProcessControl, EthosProcessControl, ProcessControl, SwitchExecutor,
};
use gruve::engine::lock::SwitchLock;
use gruve::engine::DecisionEngine;
use gruve::feed::{HttpFeed, ProfitabilityFetcher};
use gruve::notify::PushNotifier;
use gruve::settings::Settings;
use gruve::stats::StatsGatherer;
use gruve::storage::{JsonFileStore, KeyValueStore, CACHE_DOCUMENT, SETTINGS_DOCUMENT, STATS_DOCUMENT};

#[derive(Debug, Parser)]
#[command(name = "gruve", version, about = "Single-rig profit switcher")]
struct Args {
    /// Application config file.
    #[arg(short, long, default_value = "gruve.toml")]
    config: String,

    /// Run a single evaluation and exit.
    #[arg(long)]
    once: bool,

    /// Clear a stuck switch lock and exit.
    #[arg(long)]
    unlock: bool,

    /// Work under ./home and do not touch the miner.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let args = Args::parse();
    let mut cfg = AppConfig::load_or_default(&args.config)?;
    if args.dry_run {
        cfg.rig.dry_run = true;
    }

    let gruve_dir = cfg.gruve_dir();
    std::fs::create_dir_all(cfg.data_dir())
        .with_context(|| format!("Failed to create {}", gruve_dir.display()))?;

    let _log_guard = init_logging(&gruve_dir);

    let rig = cfg.rig_name();
    run(cfg, args)
        .instrument(info_span!("gruve", rig = %rig))
        .await
}

async fn run(cfg: AppConfig, args: Args) -> Result<()> {
    let rig = cfg.rig_name();
    info!(
        dry_run = cfg.rig.dry_run,
        home = %cfg.home_dir().display(),
        interval_secs = cfg.rig.scan_interval_secs,
        "GRUVE starting up"
    );

    // -- Stores and settings ---------------------------------------------

    let data_dir = cfg.data_dir();
    let settings_store: Arc<dyn KeyValueStore> =
        Arc::new(JsonFileStore::open(&data_dir, SETTINGS_DOCUMENT)?);
    let stats_store: Arc<dyn KeyValueStore> =
        Arc::new(JsonFileStore::open(&data_dir, STATS_DOCUMENT)?);
    let cache_store: Arc<dyn KeyValueStore> =
        Arc::new(JsonFileStore::open(&data_dir, CACHE_DOCUMENT)?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let settings = Settings::new(settings_store.clone());
    settings.apply_startup(&cfg.settings)?;

    let lock = SwitchLock::new(settings_store.clone(), clock.clone(), cfg.rig.lock_ttl_secs);
    if args.unlock {
        lock.force_clear()?;
        info!("Switch lock cleared");
        return Ok(());
    }

    // Without the miner configuration there is nothing to switch between.
    let miner_config = Arc::new(
        MinerConfig::load(&cfg.miner_config_path())
            .context("No configuration files found. Cannot continue.")?,
    );

    if !cfg.rig.dry_run {
        let gatherer = StatsGatherer::new(
            stats_store,
            clock.clone(),
            cfg.rig.ethos_bin_dir.join("show"),
            cfg.rig.stats_keep,
        );
        if let Err(e) = gatherer.gather().await {
            warn!(error = %e, "Stats snapshot failed");
        }
    }

    // -- Engine ----------------------------------------------------------

    let cache = Cache::new(cache_store, settings.clone(), clock.clone());
    let fetcher = ProfitabilityFetcher::new(
        settings.clone(),
        cache,
        Arc::new(HttpFeed::new()?),
        miner_config.clone(),
    );

    let process: Arc<dyn ProcessControl> = if cfg.rig.dry_run {
        Arc::new(DryRunProcessControl)
    } else {
        Arc::new(EthosProcessControl::new(cfg.rig.ethos_bin_dir.clone()))
    };
    let executor = SwitchExecutor::new(
        miner_config.clone(),
        settings.clone(),
        process,
        clock.clone(),
        cfg.local_conf_path(),
        Duration::from_secs(cfg.rig.settle_delay_secs),
    );

    let notifier = Arc::new(PushNotifier::new(settings.clone(), &rig)?);
    let engine = DecisionEngine::new(
        settings,
        lock,
        fetcher,
        executor,
        notifier,
        miner_config,
        clock,
    );

    if args.once {
        let decision = engine.evaluate().await?;
        info!(switched = decision.is_switch(), "{decision}");
        return Ok(());
    }

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.rig.scan_interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.rig.scan_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match engine.evaluate().await {
                    Ok(decision) => info!(switched = decision.is_switch(), "{decision}"),
                    Err(e) => error!(error = %e, "Evaluation failed, continuing to next"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("GRUVE shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber: console plus a daily rig log file
/// (`switcher.log.YYYY-MM-DD`) in the gruve directory.
fn init_logging(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gruve=info"));

    let json_logging = std::env::var("GRUVE_LOG_JSON").is_ok();
    let console_layer = if json_logging {
        fmt::layer().json().with_target(true).with_thread_ids(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let file_appender = tracing_appender::rolling::daily(log_dir, "switcher.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
