//! Payout tables for the two slip structures.
//!
//! `ALL_HIT` pays a single multiplier when every leg wins.
//! `PARTIAL_HIT` pays a leg-count-specific schedule of tiers, each tier
//! being a set of exact hit counts and the multiplier paid for them.
//!
//! Tables are plain data: they deserialize from `config.toml` and can be
//! swapped without touching the EV or search code.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest slip size offered.
pub const MIN_LEGS: usize = 2;
/// Largest slip size offered.
pub const MAX_LEGS: usize = 6;
/// Smallest slip size that has a partial-hit schedule.
pub const MIN_PARTIAL_LEGS: usize = 3;

/// Payout structure of a slip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStructure {
    /// Every leg must hit.
    AllHit,
    /// Near misses pay reduced multipliers.
    PartialHit,
}

impl PayoutStructure {
    /// Both structures, in reporting order.
    pub const ALL: [Self; 2] = [Self::AllHit, Self::PartialHit];

    /// Smallest leg count this structure accepts.
    pub fn min_legs(self) -> usize {
        match self {
            Self::AllHit => MIN_LEGS,
            Self::PartialHit => MIN_PARTIAL_LEGS,
        }
    }
}

impl fmt::Display for PayoutStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllHit => write!(f, "ALL_HIT"),
            Self::PartialHit => write!(f, "PARTIAL_HIT"),
        }
    }
}

/// Validation failures for a payout table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayoutError {
    #[error("{structure} leg count {legs} outside supported range")]
    LegCountOutOfRange { structure: PayoutStructure, legs: usize },
    #[error("{structure} leg count {legs} configured twice")]
    DuplicateLegCount { structure: PayoutStructure, legs: usize },
    #[error("{structure} multiplier {multiplier} for {legs} legs must be finite and non-negative")]
    InvalidMultiplier {
        structure: PayoutStructure,
        legs: usize,
        multiplier: f64,
    },
    #[error("ALL_HIT multiplier for {legs} legs must exceed 1.0, got {multiplier}")]
    MultiplierTooSmall { legs: usize, multiplier: f64 },
    #[error("PARTIAL_HIT tier for {legs} legs has no hit counts")]
    EmptyTier { legs: usize },
    #[error("PARTIAL_HIT tier for {legs} legs pays {hits} hits, more than the slip has")]
    HitCountExceedsLegs { legs: usize, hits: usize },
    #[error("PARTIAL_HIT schedule for {legs} legs lists {hits} hits in more than one tier")]
    OverlappingTiers { legs: usize, hits: usize },
}

/// ALL_HIT entry: one multiplier per leg count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllHitPayout {
    pub legs: usize,
    pub multiplier: f64,
}

/// One PARTIAL_HIT tier: exact hit counts paid at `multiplier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutTier {
    pub hits: Vec<usize>,
    pub multiplier: f64,
}

/// PARTIAL_HIT schedule for one leg count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialHitPayout {
    pub legs: usize,
    pub tiers: Vec<PayoutTier>,
}

/// Complete payout configuration for both structures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutTable {
    pub all_hit: Vec<AllHitPayout>,
    pub partial_hit: Vec<PartialHitPayout>,
}

impl PayoutTable {
    /// Multiplier paid when all `legs` hit, if that slip size is offered.
    pub fn all_hit_multiplier(&self, legs: usize) -> Option<f64> {
        self.all_hit
            .iter()
            .find(|p| p.legs == legs)
            .map(|p| p.multiplier)
    }

    /// Partial-hit tiers for `legs`, if that slip size is offered.
    pub fn partial_hit_tiers(&self, legs: usize) -> Option<&[PayoutTier]> {
        self.partial_hit
            .iter()
            .find(|p| p.legs == legs)
            .map(|p| p.tiers.as_slice())
    }

    /// Configured leg counts for a structure, ascending.
    pub fn leg_counts(&self, structure: PayoutStructure) -> Vec<usize> {
        let legs: BTreeSet<usize> = match structure {
            PayoutStructure::AllHit => self.all_hit.iter().map(|p| p.legs).collect(),
            PayoutStructure::PartialHit => self.partial_hit.iter().map(|p| p.legs).collect(),
        };
        legs.into_iter().collect()
    }

    /// Multiplier paid for each exact hit count `0..=legs`.
    ///
    /// Returns `None` when the slip size is not offered.
    pub fn payout_by_hits(&self, structure: PayoutStructure, legs: usize) -> Option<Vec<f64>> {
        let mut schedule = vec![0.0; legs + 1];
        match structure {
            PayoutStructure::AllHit => {
                schedule[legs] = self.all_hit_multiplier(legs)?;
            }
            PayoutStructure::PartialHit => {
                for tier in self.partial_hit_tiers(legs)? {
                    for &k in &tier.hits {
                        if let Some(slot) = schedule.get_mut(k) {
                            *slot += tier.multiplier;
                        }
                    }
                }
            }
        }
        Some(schedule)
    }

    /// Whether the payout never decreases as more legs hit.
    ///
    /// Expected value is non-decreasing in every leg probability exactly
    /// when this holds, which is what the bounded search relies on.
    pub fn is_monotone(&self, structure: PayoutStructure, legs: usize) -> bool {
        self.payout_by_hits(structure, legs)
            .is_some_and(|s| s.windows(2).all(|w| w[0] <= w[1]))
    }

    /// Checks ranges, multipliers and tier consistency.
    ///
    /// # Errors
    /// Returns the first [`PayoutError`] found.
    pub fn validate(&self) -> Result<(), PayoutError> {
        let mut seen = BTreeSet::new();
        for entry in &self.all_hit {
            let structure = PayoutStructure::AllHit;
            let legs = entry.legs;
            if !(MIN_LEGS..=MAX_LEGS).contains(&legs) {
                return Err(PayoutError::LegCountOutOfRange { structure, legs });
            }
            if !seen.insert(legs) {
                return Err(PayoutError::DuplicateLegCount { structure, legs });
            }
            check_multiplier(structure, legs, entry.multiplier)?;
            if entry.multiplier <= 1.0 {
                return Err(PayoutError::MultiplierTooSmall {
                    legs,
                    multiplier: entry.multiplier,
                });
            }
        }

        seen.clear();
        for entry in &self.partial_hit {
            let structure = PayoutStructure::PartialHit;
            let legs = entry.legs;
            if !(MIN_PARTIAL_LEGS..=MAX_LEGS).contains(&legs) {
                return Err(PayoutError::LegCountOutOfRange { structure, legs });
            }
            if !seen.insert(legs) {
                return Err(PayoutError::DuplicateLegCount { structure, legs });
            }
            let mut paid = BTreeSet::new();
            for tier in &entry.tiers {
                check_multiplier(structure, legs, tier.multiplier)?;
                if tier.hits.is_empty() {
                    return Err(PayoutError::EmptyTier { legs });
                }
                for &hits in &tier.hits {
                    if hits > legs {
                        return Err(PayoutError::HitCountExceedsLegs { legs, hits });
                    }
                    if !paid.insert(hits) {
                        return Err(PayoutError::OverlappingTiers { legs, hits });
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_multiplier(
    structure: PayoutStructure,
    legs: usize,
    multiplier: f64,
) -> Result<(), PayoutError> {
    if multiplier.is_finite() && multiplier >= 0.0 {
        Ok(())
    } else {
        Err(PayoutError::InvalidMultiplier {
            structure,
            legs,
            multiplier,
        })
    }
}

fn tier(hits: usize, multiplier: f64) -> PayoutTier {
    PayoutTier {
        hits: vec![hits],
        multiplier,
    }
}

impl Default for PayoutTable {
    /// Standard pick'em board: power play and flex play schedules.
    fn default() -> Self {
        let all_hit = [(2, 3.0), (3, 6.0), (4, 10.0), (5, 20.0), (6, 37.5)]
            .into_iter()
            .map(|(legs, multiplier)| AllHitPayout { legs, multiplier })
            .collect();

        let partial_hit = vec![
            PartialHitPayout {
                legs: 3,
                tiers: vec![tier(3, 3.0), tier(2, 1.0)],
            },
            PartialHitPayout {
                legs: 4,
                tiers: vec![tier(4, 6.0), tier(3, 1.5)],
            },
            PartialHitPayout {
                legs: 5,
                tiers: vec![tier(5, 10.0), tier(4, 2.0), tier(3, 0.4)],
            },
            PartialHitPayout {
                legs: 6,
                tiers: vec![tier(6, 25.0), tier(5, 2.0), tier(4, 0.4)],
            },
        ];

        Self {
            all_hit,
            partial_hit,
        }
    }
}
