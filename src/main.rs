//! Player-Prop EV Optimizer — Entry Point
//!
//! Initializes configuration and logging, then runs the refresh loop
//! until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml (or the path given as first argument) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create the proposition source (file or HTTP)
//! 4. Spawn health server (/live + /ready) and Prometheus /metrics
//! 5. Spawn config watcher (payout tables and search settings hot-reload)
//! 6. Spawn the refresh loop (gate → fetch → price → search → publish)
//! 7. Wait for SIGINT → graceful shutdown

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use prop_ev_optimizer::adapters::feeds::{FileSource, HttpSource, HttpSourceConfig};
use prop_ev_optimizer::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use prop_ev_optimizer::config::hot_reload::ConfigWatcher;
use prop_ev_optimizer::config::{loader, AppConfig, FeedKind};
use prop_ev_optimizer::ports::PropositionSource;
use prop_ev_optimizer::usecases::RefreshLoop;

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = loader::load_config(&config_path).context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.app.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.app.name,
        version = env!("CARGO_PKG_VERSION"),
        feed = ?config.feed.kind,
        pool_size = config.search.pool_size,
        "Starting player-prop EV optimizer"
    );

    // ── 3. Shutdown channel + proposition source ────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let source = build_source(&config).context("Failed to create proposition source")?;

    // ── 4. Health + metrics servers ─────────────────────────
    let health = Arc::new(HealthState::new());
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);

    let mut server_handles = Vec::new();
    if config.metrics.enabled {
        let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
        let health_shutdown = shutdown_tx.subscribe();
        server_handles.push(tokio::spawn(async move {
            if let Err(e) = health_server.run(health_shutdown).await {
                error!(error = %e, "Health server failed");
            }
        }));

        let metrics_server = Arc::clone(&metrics);
        let bind_address = config.metrics.bind_address.clone();
        let metrics_shutdown = shutdown_tx.subscribe();
        server_handles.push(tokio::spawn(async move {
            if let Err(e) = metrics_server.serve(bind_address, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }));
    }

    // ── 5. Config hot-reload ────────────────────────────────
    let (mut watcher, config_rx) =
        ConfigWatcher::new(&config_path, config.clone(), CONFIG_POLL_INTERVAL);
    let watcher_shutdown = shutdown_tx.subscribe();
    let watcher_handle = tokio::spawn(async move {
        if let Err(e) = watcher.run(watcher_shutdown).await {
            error!(error = %e, "Config watcher failed");
        }
    });

    // ── 6. Refresh loop ─────────────────────────────────────
    let (mut refresh, _report_rx) =
        RefreshLoop::new(source, config_rx, Arc::clone(&metrics), Arc::clone(&health));
    let refresh_shutdown = shutdown_tx.subscribe();
    let refresh_handle = tokio::spawn(async move {
        if let Err(e) = refresh.run(refresh_shutdown).await {
            error!(error = %e, "Refresh loop failed");
        }
    });

    info!("All tasks spawned — optimizer is running");

    // ── 7. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c()
        .await
        .context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    let _ = shutdown_tx.send(());

    // In-flight searches observe cancellation between subsets.
    let _ = tokio::time::timeout(Duration::from_secs(10), refresh_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), watcher_handle).await;
    for handle in server_handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Build the configured proposition source.
fn build_source(config: &AppConfig) -> Result<Arc<dyn PropositionSource>> {
    let feed = &config.feed;
    match feed.kind {
        FeedKind::File => {
            let path = feed.path.clone().context("File feed requires a path")?;
            Ok(Arc::new(FileSource::new(path)))
        }
        FeedKind::Http => {
            let url = feed.url.clone().context("HTTP feed requires a url")?;
            let mut http_config = HttpSourceConfig::new(url);
            http_config.timeout = Duration::from_secs(feed.timeout_seconds);
            http_config.max_retries = feed.max_retries;
            http_config.requests_per_minute = feed.requests_per_minute;
            Ok(Arc::new(HttpSource::new(http_config)?))
        }
    }
}
