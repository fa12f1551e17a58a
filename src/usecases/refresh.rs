//! Refresh Loop - Fetch Gating and Cycle Supersession
//!
//! Drives the core once per refresh period:
//! 1. Ask the `RefetchGate` whether the source may be hit again
//! 2. Fetch, or reuse the last good table
//! 3. Cancel any cycle still running and start a new one
//! 4. Publish the cycle's report only if no newer cycle has started
//!
//! The gate is the only state carried between cycles. Every cycle
//! re-prices and re-searches from scratch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::metrics::{HealthState, MetricsRegistry};
use crate::config::AppConfig;
use crate::domain::proposition::RawProposition;
use crate::domain::search::{CancelFlag, SearchError};
use crate::ports::PropositionSource;

use super::optimizer::{Optimizer, ResultSet};
use super::pricing::{price_table, Exclusion};

/// Cooldown between fetches plus the last table that arrived intact.
#[derive(Debug, Clone)]
pub struct RefetchGate {
  min_gap: Duration,
  last_fetch: Option<DateTime<Utc>>,
  last_good: Option<Arc<Vec<RawProposition>>>,
}

impl RefetchGate {
  pub fn new(min_gap: Duration) -> Self {
    Self {
      min_gap,
      last_fetch: None,
      last_good: None,
    }
  }

  pub fn set_min_gap(&mut self, min_gap: Duration) {
    self.min_gap = min_gap;
  }

  /// True when nothing was fetched yet or the gap has fully elapsed.
  pub fn should_refetch(&self, now: DateTime<Utc>) -> bool {
    match self.last_fetch {
      None => true,
      Some(last) => (now - last)
        .to_std()
        .is_ok_and(|elapsed| elapsed >= self.min_gap),
    }
  }

  /// Stores a fresh table and restarts the cooldown.
  pub fn record_success(
    &mut self,
    now: DateTime<Utc>,
    rows: Vec<RawProposition>,
  ) -> Arc<Vec<RawProposition>> {
    let rows = Arc::new(rows);
    self.last_fetch = Some(now);
    self.last_good = Some(Arc::clone(&rows));
    rows
  }

  /// Restarts the cooldown after a failed fetch and hands back the
  /// last good table, if any.
  pub fn record_failure(&mut self, now: DateTime<Utc>) -> Option<Arc<Vec<RawProposition>>> {
    self.last_fetch = Some(now);
    self.last_good()
  }

  pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
    self.last_fetch
  }

  pub fn last_good(&self) -> Option<Arc<Vec<RawProposition>>> {
    self.last_good.clone()
  }
}

/// Everything one completed cycle produced.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
  pub id: Uuid,
  pub generated_at: DateTime<Utc>,
  /// Records in the raw table.
  pub table_rows: usize,
  /// Records that priced successfully.
  pub priced: usize,
  pub degenerate: usize,
  pub excluded: Vec<Exclusion>,
  pub results: ResultSet,
}

/// Price `rows` and search them with the settings in `config`.
///
/// # Errors
/// [`SearchError::Cancelled`] when `cancel` is raised mid-cycle.
#[instrument(skip_all, fields(rows = rows.len()))]
pub async fn run_cycle(
  rows: Arc<Vec<RawProposition>>,
  config: &AppConfig,
  cancel: &CancelFlag,
) -> Result<CycleReport, SearchError> {
  let optimizer =
    Optimizer::new(config.payouts.clone()).with_exhaustive_limit(config.search.exhaustive_limit);
  let pricing = price_table(rows.to_vec(), optimizer.calculator());

  let results = optimizer
    .run(
      &pricing.priced,
      config.search.pool_size,
      config.search.exclude_same_group,
      cancel,
    )
    .await?;

  Ok(CycleReport {
    id: Uuid::new_v4(),
    generated_at: Utc::now(),
    table_rows: rows.len(),
    priced: pricing.priced.len(),
    degenerate: pricing.degenerate,
    excluded: pricing.excluded,
    results,
  })
}

/// Shared sink for finished cycles.
struct Publisher {
  report_tx: watch::Sender<Option<Arc<CycleReport>>>,
  metrics: Arc<MetricsRegistry>,
  health: Arc<HealthState>,
  /// Bumped whenever a cycle starts; only the latest may publish.
  generation: AtomicU64,
  /// Generation of the report currently on `report_tx`. Held across the
  /// generation check, metrics and send so publishing is one step.
  published: Mutex<u64>,
}

impl Publisher {
  fn finish(&self, generation: u64, outcome: Result<CycleReport, SearchError>) {
    let mut published = self
      .published
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    let current = self.generation.load(Ordering::SeqCst) == generation && generation > *published;

    match outcome {
      Ok(report) if current => {
        self.publish(report);
        *published = generation;
      }
      Ok(_) | Err(SearchError::Cancelled) => {
        debug!(generation, "Cycle superseded, discarding");
        self.metrics.cycles.with_label_values(&["superseded"]).inc();
      }
      Err(e) => {
        error!(generation, error = %e, "Cycle failed");
        self.metrics.cycles.with_label_values(&["failed"]).inc();
      }
    }
  }

  fn publish(&self, report: CycleReport) {
    let metrics = &self.metrics;
    for exclusion in &report.excluded {
      metrics.excluded.with_label_values(&[exclusion.kind]).inc();
    }
    metrics.degenerate_devig.inc_by(report.degenerate as u64);
    metrics
      .pool_size
      .set(i64::try_from(report.results.pool_size).unwrap_or(i64::MAX));

    for entry in &report.results.results {
      let structure = entry.structure.to_string();
      let legs = entry.legs.to_string();
      let labels = [structure.as_str(), legs.as_str()];
      metrics
        .search_seconds
        .with_label_values(&labels)
        .observe(entry.elapsed.as_secs_f64());
      match entry.expected_value {
        Some(ev) => metrics.best_ev.with_label_values(&labels).set(ev),
        None => {
          let _ = metrics.best_ev.remove_label_values(&labels);
        }
      }
    }
    metrics.cycles.with_label_values(&["published"]).inc();

    match serde_json::to_string(&report) {
      Ok(json) => info!(
        cycle_id = %report.id,
        pool = report.results.pool_size,
        excluded = report.excluded.len(),
        report = %json,
        "Cycle published"
      ),
      Err(e) => warn!(cycle_id = %report.id, error = %e, "Failed to serialize report"),
    }

    self.health.mark_published();
    self.report_tx.send_replace(Some(Arc::new(report)));
  }
}

struct InFlight {
  cancel: CancelFlag,
  handle: JoinHandle<()>,
}

/// Periodic driver that fetches through the gate and runs cycles.
pub struct RefreshLoop<S: PropositionSource + ?Sized> {
  source: Arc<S>,
  config_rx: watch::Receiver<AppConfig>,
  gate: RefetchGate,
  publisher: Arc<Publisher>,
  in_flight: Option<InFlight>,
}

impl<S: PropositionSource + ?Sized> RefreshLoop<S> {
  /// Create the loop and the receiver its reports are published on.
  pub fn new(
    source: Arc<S>,
    config_rx: watch::Receiver<AppConfig>,
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthState>,
  ) -> (Self, watch::Receiver<Option<Arc<CycleReport>>>) {
    let min_gap = Duration::from_secs(config_rx.borrow().feed.min_refetch_gap_seconds);
    let (report_tx, report_rx) = watch::channel(None);
    let publisher = Arc::new(Publisher {
      report_tx,
      metrics,
      health,
      generation: AtomicU64::new(0),
      published: Mutex::new(0),
    });

    let refresh = Self {
      source,
      config_rx,
      gate: RefetchGate::new(min_gap),
      publisher,
      in_flight: None,
    };
    (refresh, report_rx)
  }

  pub fn gate(&self) -> &RefetchGate {
    &self.gate
  }

  /// Run one refresh step at `now`.
  ///
  /// Fetches when the gate allows it, then starts a cycle on the
  /// freshest table available, superseding any cycle still running.
  #[instrument(skip(self), fields(source = self.source.name()))]
  pub async fn tick(&mut self, now: DateTime<Utc>) {
    let config = self.config_rx.borrow().clone();
    self
      .gate
      .set_min_gap(Duration::from_secs(config.feed.min_refetch_gap_seconds));

    let rows = if self.gate.should_refetch(now) {
      match self.source.fetch().await {
        Ok(rows) => {
          info!(rows = rows.len(), "Proposition table fetched");
          self.publisher.health.set_feed_healthy(true);
          Some(self.gate.record_success(now, rows))
        }
        Err(e) => {
          warn!(error = %e, "Fetch failed, reusing last good table");
          self.publisher.health.set_feed_healthy(false);
          self.gate.record_failure(now)
        }
      }
    } else {
      debug!("Within refetch gap, reusing last good table");
      self.gate.last_good()
    };

    let Some(rows) = rows else {
      warn!("No proposition table available yet, skipping cycle");
      self
        .publisher
        .metrics
        .cycles
        .with_label_values(&["skipped"])
        .inc();
      return;
    };

    self.supersede();
    let generation = self.publisher.generation.fetch_add(1, Ordering::SeqCst) + 1;
    let cancel = CancelFlag::new();
    let task_cancel = cancel.clone();
    let publisher = Arc::clone(&self.publisher);

    let handle = tokio::spawn(async move {
      let outcome = run_cycle(rows, &config, &task_cancel).await;
      publisher.finish(generation, outcome);
    });
    self.in_flight = Some(InFlight { cancel, handle });
  }

  /// Wait for the cycle started by the last tick, if any.
  pub async fn wait_idle(&mut self) {
    if let Some(in_flight) = self.in_flight.take() {
      if let Err(e) = in_flight.handle.await {
        warn!(error = %e, "Cycle task panicked");
      }
    }
  }

  fn supersede(&mut self) {
    if let Some(previous) = self.in_flight.take() {
      if !previous.handle.is_finished() {
        debug!("Cancelling in-flight cycle");
        previous.cancel.cancel();
      }
    }
  }

  /// Tick every `refresh_seconds` until shutdown.
  ///
  /// The period is read once at start; payout and search settings are
  /// re-read on every tick.
  pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    let period = Duration::from_secs(self.config_rx.borrow().feed.refresh_seconds.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
      source = self.source.name(),
      period_secs = period.as_secs(),
      "Starting refresh loop"
    );

    loop {
      tokio::select! {
        _ = shutdown_rx.recv() => {
          info!("Shutdown signal received, stopping refresh loop");
          break;
        }
        _ = ticker.tick() => {
          self.tick(Utc::now()).await;
        }
      }
    }

    if let Some(in_flight) = self.in_flight.take() {
      in_flight.cancel.cancel();
      let _ = in_flight.handle.await;
    }
    Ok(())
  }
}
