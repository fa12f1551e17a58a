//! Best-slip search over a ranked candidate pool.
//!
//! Subsets are walked depth-first in lexicographic index order and a
//! new candidate replaces the incumbent only on a strictly greater EV,
//! so exact ties resolve to the lexicographically smallest index tuple.
//!
//! Cost is `C(pool, legs)` evaluations. Pools up to the exhaustive limit
//! (default 32, i.e. 906,192 six-leg subsets) are enumerated in full.
//! Larger pools switch to branch-and-bound: every unfilled leg is
//! replaced by the best probability still available later in the pool,
//! and a branch whose optimistic EV cannot beat the incumbent is cut.
//! That bound is only valid when the payout never drops as more legs
//! hit; for other schedules the pool is truncated to the limit instead,
//! though never below the slip size.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use super::constraint::ConstraintFilter;
use super::ev::{EvCalculator, EvError};
use super::payout::PayoutStructure;
use super::proposition::PricedProposition;

/// Largest pool that is always enumerated exhaustively by default.
pub const DEFAULT_EXHAUSTIVE_LIMIT: usize = 32;
/// Hard ceiling on the pool size a caller may request.
pub const MAX_POOL_SIZE: usize = 64;

/// Slack applied to bound comparisons so rounding never prunes a winner.
const BOUND_SLACK: f64 = 1e-12;

/// Cooperative cancellation shared between a cycle and its searches.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests every search holding this flag to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SearchError {
    #[error("search cancelled")]
    Cancelled,
    #[error(transparent)]
    Ev(#[from] EvError),
}

/// How the pool was explored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Exhaustive,
    BranchAndBound,
    /// Pool cut to the exhaustive limit; best effort only.
    Truncated,
}

/// Winning subset: sorted pool indices and its EV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub indices: Vec<usize>,
    pub expected_value: f64,
}

impl Candidate {
    /// Resolves the indices against the pool they were drawn from.
    pub fn members<'p>(&self, pool: &'p [PricedProposition]) -> Vec<&'p PricedProposition> {
        self.indices.iter().filter_map(|&i| pool.get(i)).collect()
    }
}

/// Result of one (structure, legs) search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchReport {
    pub structure: PayoutStructure,
    pub legs: usize,
    pub best: Option<Candidate>,
    pub mode: SearchMode,
    /// Subsets whose EV was computed.
    pub evaluated: u64,
    /// Branches cut by the bound.
    pub pruned: u64,
}

/// Finds the EV-maximizing admissible subset of a fixed size.
#[derive(Debug, Clone, Copy)]
pub struct CombinationSearch<'a> {
    calculator: &'a EvCalculator,
    filter: ConstraintFilter,
    exhaustive_limit: usize,
}

impl<'a> CombinationSearch<'a> {
    pub fn new(calculator: &'a EvCalculator, filter: ConstraintFilter) -> Self {
        Self {
            calculator,
            filter,
            exhaustive_limit: DEFAULT_EXHAUSTIVE_LIMIT,
        }
    }

    /// Overrides the pool size up to which enumeration is exhaustive.
    pub fn with_exhaustive_limit(mut self, limit: usize) -> Self {
        self.exhaustive_limit = limit.max(1);
        self
    }

    /// Best admissible `legs`-subset of `pool` under `structure`.
    ///
    /// A pool with fewer than `legs` propositions, or with no admissible
    /// subset, yields `best: None`.
    ///
    /// # Errors
    /// [`SearchError::Cancelled`] once `cancel` is raised (no partial
    /// result is returned), [`SearchError::Ev`] if the payout table has
    /// no entry for `legs` or a pool probability is invalid.
    pub fn best(
        &self,
        pool: &[PricedProposition],
        structure: PayoutStructure,
        legs: usize,
        cancel: &CancelFlag,
    ) -> Result<SearchReport, SearchError> {
        let table = self.calculator.table();
        if legs == 0 || table.payout_by_hits(structure, legs).is_none() {
            return Err(EvError::UnsupportedLegCount { structure, legs }.into());
        }

        let (pool, mode) = if pool.len() <= self.exhaustive_limit {
            (pool, SearchMode::Exhaustive)
        } else if table.is_monotone(structure, legs) {
            (pool, SearchMode::BranchAndBound)
        } else {
            warn!(
                %structure,
                legs,
                pool = pool.len(),
                limit = self.exhaustive_limit,
                "Payout schedule not monotone, truncating pool for exhaustive search"
            );
            let keep = self.exhaustive_limit.max(legs).min(pool.len());
            (&pool[..keep], SearchMode::Truncated)
        };

        let mut walk = Walk::new(self, pool, structure, legs, cancel, mode);
        if pool.len() >= legs {
            walk.descend(0)?;
        }

        Ok(SearchReport {
            structure,
            legs,
            best: walk.best,
            mode,
            evaluated: walk.evaluated,
            pruned: walk.pruned,
        })
    }
}

/// Depth-first walk state for one search.
struct Walk<'s, 'p> {
    calculator: &'s EvCalculator,
    filter: ConstraintFilter,
    cancel: &'s CancelFlag,
    pool: &'p [PricedProposition],
    structure: PayoutStructure,
    legs: usize,
    bounded: bool,
    /// `suffix_max[i]` = highest fair probability in `pool[i..]`.
    suffix_max: Vec<f64>,
    chosen: Vec<usize>,
    members: Vec<&'p PricedProposition>,
    probs: Vec<f64>,
    scratch: Vec<f64>,
    best: Option<Candidate>,
    evaluated: u64,
    pruned: u64,
}

impl<'s, 'p> Walk<'s, 'p> {
    fn new(
        search: &CombinationSearch<'s>,
        pool: &'p [PricedProposition],
        structure: PayoutStructure,
        legs: usize,
        cancel: &'s CancelFlag,
        mode: SearchMode,
    ) -> Self {
        let mut suffix_max = vec![0.0_f64; pool.len() + 1];
        for i in (0..pool.len()).rev() {
            suffix_max[i] = suffix_max[i + 1].max(pool[i].fair_probability);
        }

        Self {
            calculator: search.calculator,
            filter: search.filter,
            cancel,
            pool,
            structure,
            legs,
            bounded: mode == SearchMode::BranchAndBound,
            suffix_max,
            chosen: Vec::with_capacity(legs),
            members: Vec::with_capacity(legs),
            probs: Vec::with_capacity(legs),
            scratch: Vec::with_capacity(legs),
            best: None,
            evaluated: 0,
            pruned: 0,
        }
    }

    fn descend(&mut self, start: usize) -> Result<(), SearchError> {
        let remaining = self.legs - self.chosen.len();
        if remaining == 0 {
            return self.evaluate();
        }

        let pool = self.pool;
        for i in start..=pool.len() - remaining {
            if self.cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            let candidate = &pool[i];
            if !self.filter.can_extend(&self.members, candidate) {
                continue;
            }

            self.chosen.push(i);
            self.members.push(candidate);
            self.probs.push(candidate.fair_probability);

            let explore = !self.bounded || remaining == 1 || self.bound_allows(i + 1)?;
            let outcome = if explore {
                self.descend(i + 1)
            } else {
                self.pruned += 1;
                Ok(())
            };

            self.chosen.pop();
            self.members.pop();
            self.probs.pop();
            outcome?;
        }
        Ok(())
    }

    /// Whether the subtree below the current prefix could still beat the incumbent.
    fn bound_allows(&mut self, next: usize) -> Result<bool, SearchError> {
        let Some(best) = &self.best else {
            return Ok(true);
        };
        let open = self.legs - self.probs.len();
        let optimistic = self.suffix_max[next];

        self.scratch.clear();
        self.scratch.extend_from_slice(&self.probs);
        self.scratch.extend(std::iter::repeat(optimistic).take(open));
        let bound = self.calculator.ev(self.structure, &self.scratch)?;
        Ok(bound >= best.expected_value - BOUND_SLACK)
    }

    fn evaluate(&mut self) -> Result<(), SearchError> {
        if self.cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let ev = self.calculator.ev(self.structure, &self.probs)?;
        self.evaluated += 1;
        if self.best.as_ref().is_none_or(|b| ev > b.expected_value) {
            self.best = Some(Candidate {
                indices: self.chosen.clone(),
                expected_value: ev,
            });
        }
        Ok(())
    }
}
