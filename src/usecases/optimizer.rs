//! Optimizer - Best Slip per Structure and Size
//!
//! Second core entry point. Ranks a priced table, cuts it to the pool
//! cap and runs one combination search per (structure, leg count)
//! offered by the payout table. The searches share nothing mutable and
//! run side by side on the blocking pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::domain::constraint::ConstraintFilter;
use crate::domain::ev::EvCalculator;
use crate::domain::payout::{PayoutStructure, PayoutTable};
use crate::domain::proposition::PricedProposition;
use crate::domain::search::{
  CancelFlag, CombinationSearch, SearchError, SearchMode, DEFAULT_EXHAUSTIVE_LIMIT, MAX_POOL_SIZE,
};

use super::pricing::rank_by_edge;

/// Best admissible slip for one (structure, n), or nulls when none exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestResult {
  pub structure: PayoutStructure,
  #[serde(rename = "n")]
  pub legs: usize,
  pub expected_value: Option<f64>,
  /// Positions of the members within the ranked pool.
  pub indices: Option<Vec<usize>>,
  pub members: Option<Vec<PricedProposition>>,
  /// `None` when the search itself failed.
  pub mode: Option<SearchMode>,
  #[serde(skip)]
  pub elapsed: Duration,
}

impl BestResult {
  fn empty(structure: PayoutStructure, legs: usize, mode: Option<SearchMode>) -> Self {
    Self {
      structure,
      legs,
      expected_value: None,
      indices: None,
      members: None,
      mode,
      elapsed: Duration::ZERO,
    }
  }

  pub fn is_null(&self) -> bool {
    self.expected_value.is_none()
  }
}

/// Full best-result set of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
  /// Propositions handed to the search after ranking and capping.
  pub pool_size: usize,
  pub results: Vec<BestResult>,
}

impl ResultSet {
  pub fn get(&self, structure: PayoutStructure, legs: usize) -> Option<&BestResult> {
    self
      .results
      .iter()
      .find(|r| r.structure == structure && r.legs == legs)
  }

  /// True when no (structure, n) produced a slip.
  pub fn is_all_null(&self) -> bool {
    self.results.iter().all(BestResult::is_null)
  }
}

/// Runs every (structure, n) search for one payout table.
#[derive(Debug, Clone)]
pub struct Optimizer {
  calculator: Arc<EvCalculator>,
  exhaustive_limit: usize,
}

impl Optimizer {
  pub fn new(table: PayoutTable) -> Self {
    Self {
      calculator: Arc::new(EvCalculator::new(table)),
      exhaustive_limit: DEFAULT_EXHAUSTIVE_LIMIT,
    }
  }

  pub fn with_exhaustive_limit(mut self, limit: usize) -> Self {
    self.exhaustive_limit = limit;
    self
  }

  pub fn calculator(&self) -> &EvCalculator {
    &self.calculator
  }

  /// Every (structure, n) pair the payout table offers, in output order.
  pub fn jobs(&self) -> Vec<(PayoutStructure, usize)> {
    PayoutStructure::ALL
      .into_iter()
      .flat_map(|structure| {
        self
          .calculator
          .table()
          .leg_counts(structure)
          .into_iter()
          .map(move |legs| (structure, legs))
      })
      .collect()
  }

  /// Synchronous form of [`Optimizer::run`] for callers without a runtime.
  ///
  /// # Errors
  /// [`SearchError::Cancelled`] if `cancel` is raised before every
  /// search has finished.
  pub fn run_blocking(
    &self,
    table: &[PricedProposition],
    pool_cap: usize,
    exclude_same_group: bool,
    cancel: &CancelFlag,
  ) -> Result<ResultSet, SearchError> {
    let pool = build_pool(table, pool_cap);
    let filter = ConstraintFilter::new(exclude_same_group);

    let results = self
      .jobs()
      .into_iter()
      .map(|(structure, legs)| {
        let outcome = search_one(
          &self.calculator,
          self.exhaustive_limit,
          &pool,
          filter,
          structure,
          legs,
          cancel,
        );
        settle(structure, legs, outcome)
      })
      .collect::<Result<Vec<_>, _>>()?;

    Ok(ResultSet {
      pool_size: pool.len(),
      results,
    })
  }

  /// Best-result set for `table`, one search per blocking task.
  ///
  /// # Errors
  /// [`SearchError::Cancelled`] if `cancel` is raised before every
  /// search has finished. Other per-search failures become null entries.
  #[instrument(skip(self, table, cancel), fields(rows = table.len()))]
  pub async fn run(
    &self,
    table: &[PricedProposition],
    pool_cap: usize,
    exclude_same_group: bool,
    cancel: &CancelFlag,
  ) -> Result<ResultSet, SearchError> {
    let pool: Arc<[PricedProposition]> = build_pool(table, pool_cap).into();
    let filter = ConstraintFilter::new(exclude_same_group);

    let handles: Vec<((PayoutStructure, usize), JoinHandle<_>)> = self
      .jobs()
      .into_iter()
      .map(|(structure, legs)| {
        let calculator = Arc::clone(&self.calculator);
        let pool = Arc::clone(&pool);
        let cancel = cancel.clone();
        let limit = self.exhaustive_limit;
        let handle = tokio::task::spawn_blocking(move || {
          search_one(&calculator, limit, &pool, filter, structure, legs, &cancel)
        });
        ((structure, legs), handle)
      })
      .collect();

    let mut results = Vec::with_capacity(handles.len());
    for ((structure, legs), handle) in handles {
      let entry = match handle.await {
        Ok(outcome) => settle(structure, legs, outcome),
        Err(e) => {
          warn!(%structure, legs, error = %e, "Search task failed");
          Ok(BestResult::empty(structure, legs, None))
        }
      };
      results.push(entry?);
    }

    Ok(ResultSet {
      pool_size: pool.len(),
      results,
    })
  }
}

/// Highest-edge propositions first, capped at `pool_cap`.
fn build_pool(table: &[PricedProposition], pool_cap: usize) -> Vec<PricedProposition> {
  let mut pool = table.to_vec();
  rank_by_edge(&mut pool);
  pool.truncate(pool_cap.min(MAX_POOL_SIZE));
  pool
}

fn search_one(
  calculator: &EvCalculator,
  exhaustive_limit: usize,
  pool: &[PricedProposition],
  filter: ConstraintFilter,
  structure: PayoutStructure,
  legs: usize,
  cancel: &CancelFlag,
) -> Result<BestResult, SearchError> {
  let started = Instant::now();
  let report = CombinationSearch::new(calculator, filter)
    .with_exhaustive_limit(exhaustive_limit)
    .best(pool, structure, legs, cancel)?;
  let elapsed = started.elapsed();

  debug!(
    %structure,
    legs,
    mode = ?report.mode,
    evaluated = report.evaluated,
    pruned = report.pruned,
    elapsed_ms = elapsed.as_millis(),
    "Search finished"
  );

  let mut entry = match report.best {
    Some(best) => BestResult {
      structure,
      legs,
      expected_value: Some(best.expected_value),
      members: Some(best.members(pool).into_iter().cloned().collect()),
      indices: Some(best.indices),
      mode: Some(report.mode),
      elapsed: Duration::ZERO,
    },
    None => BestResult::empty(structure, legs, Some(report.mode)),
  };
  entry.elapsed = elapsed;
  Ok(entry)
}

/// Cancellation aborts the set; any other failure nulls just this entry.
fn settle(
  structure: PayoutStructure,
  legs: usize,
  outcome: Result<BestResult, SearchError>,
) -> Result<BestResult, SearchError> {
  match outcome {
    Ok(entry) => Ok(entry),
    Err(SearchError::Cancelled) => Err(SearchError::Cancelled),
    Err(SearchError::Ev(e)) => {
      warn!(%structure, legs, error = %e, "Search failed, reporting null");
      Ok(BestResult::empty(structure, legs, None))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::proposition::RawProposition;
  use crate::usecases::pricing::price_table;

  fn table(rows: &[(&str, &str, i32, i32)]) -> Vec<PricedProposition> {
    let raw = rows
      .iter()
      .map(|&(player, group, over, under)| RawProposition {
        player: player.to_string(),
        team: String::new(),
        market: "Points".to_string(),
        line: Some(20.5),
        price_favorable: Some(over),
        price_unfavorable: Some(under),
        group: group.to_string(),
        malformed: None,
      })
      .collect();
    price_table(raw, &EvCalculator::default()).priced
  }

  fn board() -> Vec<PricedProposition> {
    table(&[
      ("A", "G1", -150, 130),
      ("B", "G1", -180, 150),
      ("C", "G2", -120, 100),
      ("D", "G3", -135, 115),
      ("E", "G4", -110, -110),
      ("F", "G5", -200, 170),
    ])
  }

  #[test]
  fn test_jobs_cover_both_structures() {
    let jobs = Optimizer::new(PayoutTable::default()).jobs();
    assert_eq!(jobs.len(), 9);
    assert_eq!(jobs[0], (PayoutStructure::AllHit, 2));
    assert_eq!(jobs[5], (PayoutStructure::PartialHit, 3));
  }

  #[test]
  fn test_empty_table_is_all_null() {
    let set = Optimizer::new(PayoutTable::default())
      .run_blocking(&[], 32, false, &CancelFlag::new())
      .unwrap();
    assert_eq!(set.pool_size, 0);
    assert_eq!(set.results.len(), 9);
    assert!(set.is_all_null());
  }

  #[test]
  fn test_pool_ranked_and_capped() {
    let optimizer = Optimizer::new(PayoutTable::default());
    let set = optimizer
      .run_blocking(&board(), 3, false, &CancelFlag::new())
      .unwrap();
    assert_eq!(set.pool_size, 3);

    let two = set.get(PayoutStructure::AllHit, 2).unwrap();
    let players: Vec<_> = two
      .members
      .as_ref()
      .unwrap()
      .iter()
      .map(|m| m.proposition.player.as_str())
      .collect();
    assert_eq!(players, vec!["F", "B"]);
    assert!(set.get(PayoutStructure::AllHit, 4).unwrap().is_null());
  }

  #[test]
  fn test_exclusion_respected_in_every_entry() {
    let set = Optimizer::new(PayoutTable::default())
      .run_blocking(&board(), 32, true, &CancelFlag::new())
      .unwrap();
    for entry in &set.results {
      if let Some(members) = &entry.members {
        let refs: Vec<_> = members.iter().collect();
        assert!(ConstraintFilter::new(true).is_admissible(&refs));
      }
    }
    // Only five distinct groups exist.
    assert!(set.get(PayoutStructure::AllHit, 6).unwrap().is_null());
    assert!(!set.get(PayoutStructure::AllHit, 5).unwrap().is_null());
  }

  #[test]
  fn test_cancelled_run_has_no_result() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let outcome = Optimizer::new(PayoutTable::default()).run_blocking(&board(), 32, false, &cancel);
    assert_eq!(outcome, Err(SearchError::Cancelled));
  }

  #[tokio::test]
  async fn test_async_run_matches_blocking() {
    let optimizer = Optimizer::new(PayoutTable::default());
    let board = board();
    let cancel = CancelFlag::new();
    let blocking = optimizer.run_blocking(&board, 32, false, &cancel).unwrap();
    let parallel = optimizer.run(&board, 32, false, &cancel).await.unwrap();
    assert_eq!(blocking.results.len(), parallel.results.len());
    for (a, b) in blocking.results.iter().zip(&parallel.results) {
      assert_eq!(a.indices, b.indices);
      assert_eq!(a.expected_value, b.expected_value);
    }
  }

  #[test]
  fn test_result_serializes_with_n_and_nulls() {
    let set = Optimizer::new(PayoutTable::default())
      .run_blocking(&[], 32, false, &CancelFlag::new())
      .unwrap();
    let json = serde_json::to_value(&set).unwrap();
    let first = &json["results"][0];
    assert_eq!(first["structure"], "ALL_HIT");
    assert_eq!(first["n"], 2);
    assert!(first["expected_value"].is_null());
    assert!(first["members"].is_null());
    assert!(first.get("elapsed").is_none());
  }
}
