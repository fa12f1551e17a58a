//! Prometheus Metrics Registry - Cycle Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards:
//! cycle outcomes, excluded propositions, search timing and the best
//! EV found per structure and slip size.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Centralized Prometheus metrics for the optimizer.
///
/// All metrics follow the naming convention `prop_ev_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Refresh cycles by outcome (published, superseded, failed, skipped).
    pub cycles: IntCounterVec,
    /// Propositions kept out of the pool, by reason.
    pub excluded: IntCounterVec,
    /// Quotes whose implied pair could not be normalized.
    pub degenerate_devig: IntCounter,
    /// Wall time of one (structure, legs) search in seconds.
    pub search_seconds: HistogramVec,
    /// Best EV of the last published cycle.
    pub best_ev: GaugeVec,
    /// Pool size of the last published cycle.
    pub pool_size: IntGauge,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles = IntCounterVec::new(
            Opts::new("prop_ev_cycles_total", "Refresh cycles by outcome"),
            &["outcome"],
        )?;

        let excluded = IntCounterVec::new(
            Opts::new(
                "prop_ev_propositions_excluded_total",
                "Propositions excluded from the pool",
            ),
            &["reason"],
        )?;

        let degenerate_devig = IntCounter::new(
            "prop_ev_degenerate_devig_total",
            "Two-sided quotes that fell back to a 0.5/0.5 split",
        )?;

        let search_seconds = HistogramVec::new(
            HistogramOpts::new(
                "prop_ev_search_seconds",
                "Duration of one best-slip search",
            )
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["structure", "legs"],
        )?;

        let best_ev = GaugeVec::new(
            Opts::new(
                "prop_ev_best_expected_value",
                "Best EV per unit stake in the last published cycle",
            ),
            &["structure", "legs"],
        )?;

        let pool_size = IntGauge::new(
            "prop_ev_pool_size",
            "Propositions handed to the search in the last published cycle",
        )?;

        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(excluded.clone()))?;
        registry.register(Box::new(degenerate_devig.clone()))?;
        registry.register(Box::new(search_seconds.clone()))?;
        registry.register(Box::new(best_ev.clone()))?;
        registry.register(Box::new(pool_size.clone()))?;

        Ok(Self {
            registry,
            cycles,
            excluded,
            degenerate_devig,
            search_seconds,
            best_ev,
            pool_size,
        })
    }

    /// Render the registry in the Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics);
                async move { metrics.render() }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.cycles.with_label_values(&["published"]).inc();
        metrics.best_ev.with_label_values(&["ALL_HIT", "2"]).set(0.12);
        let text = metrics.render();
        assert!(text.contains("prop_ev_cycles_total{outcome=\"published\"} 1"));
        assert!(text.contains("prop_ev_best_expected_value"));
    }
}
