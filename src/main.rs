//! league-sync - schedule and stats synchronization engine
//!
//! Loads the configuration, wires the store, cache, locks and provider
//! together and runs the adaptive scheduler until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use league_sync::config::{Config, HealthConfig};
use league_sync::database::SqliteStore;
use league_sync::health;
use league_sync::otel::{init_tracing, OtelProvider};
use league_sync::plugins::build_lock_coordinator;
use league_sync::plugins::cache::{build_backend, CacheLayer};
use league_sync::provider::{HttpSportsProvider, ResilientProvider};
use league_sync::sync::{AdaptiveScheduler, Orchestrator, SyncMetricsRecorder, TickRunner, TickState};

/// league-sync - schedule and stats synchronization engine
#[derive(Parser, Debug)]
#[command(name = "league-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "LEAGUE_SYNC_CONFIG")]
    config: Option<String>,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting league-sync");

    let store = Arc::new(
        SqliteStore::open(
            &config.database.path,
            Duration::from_millis(config.database.busy_timeout_ms),
        )
        .await?,
    );
    info!(path = %config.database.path, "Database initialized");

    let cache = Arc::new(CacheLayer::new(build_backend(&config.cache)?));
    info!(backend = cache.backend_name(), "Cache initialized");

    let locks = Arc::new(build_lock_coordinator(&config.lock, &store).await?);

    let provider = ResilientProvider::new(HttpSportsProvider::new(&config.provider)?, &config.provider);
    info!(base_url = %config.provider.base_url, "Provider initialized");

    let metrics = Arc::new(SyncMetricsRecorder::default());
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        Arc::new(provider),
        cache.clone(),
        locks,
        metrics.clone(),
        config.sync.clone(),
    ));

    if args.once {
        let mut state = TickState::new();
        let report = orchestrator.run_tick(&mut state).await;
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            live_games = report.live_games,
            "Single tick complete"
        );
        log_health(&cache, &metrics, &config.health).await;
        shutdown_otel(&otel_provider);
        return Ok(());
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scheduler = AdaptiveScheduler::new(
        config.scheduler.clone(),
        orchestrator.clone(),
        shutdown_tx.subscribe(),
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    let health_task = tokio::spawn(health_loop(
        cache.clone(),
        metrics.clone(),
        config.health.clone(),
        shutdown_tx.subscribe(),
    ));

    shutdown_signal().await;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    if let Err(e) = scheduler_task.await {
        error!(error = %e, "Scheduler task failed");
    }
    let _ = health_task.await;

    shutdown_otel(&otel_provider);
    info!("league-sync shutdown complete");
    Ok(())
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

async fn log_health(cache: &CacheLayer, metrics: &SyncMetricsRecorder, thresholds: &HealthConfig) {
    let report = health::evaluate(&cache.statistics().await, &metrics.snapshot(), thresholds, Utc::now());
    report.log();
}

/// Periodically purge expired cache entries and log a health report
async fn health_loop(
    cache: Arc<CacheLayer>,
    metrics: Arc<SyncMetricsRecorder>,
    thresholds: HealthConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(thresholds.log_interval_secs.max(1)));
    // The first tick fires immediately; skip it so the first report has data
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let purged = cache.purge_expired().await;
                if purged > 0 {
                    info!(purged, "Purged expired cache entries");
                }
                log_health(&cache, &metrics, &thresholds).await;
            }
        }
    }
}

fn shutdown_otel(otel_provider: &OtelProvider) {
    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }
}

/// Resolves when SIGINT or SIGTERM arrives
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
