//! Expected value of a slip per unit stake.
//!
//! Legs are treated as independent Bernoulli trials with their own
//! fair probabilities. ALL_HIT needs only the joint probability; the
//! PARTIAL_HIT schedule needs the full distribution of the number of
//! hits, which is Poisson-binomial (legs are not identically
//! distributed) and is computed exactly with a small DP.

use thiserror::Error;

use super::payout::{PayoutStructure, PayoutTable};

/// Maximum allowed deviation of the hit distribution's total mass from 1.
pub const MASS_TOLERANCE: f64 = 1e-9;

/// Failures while pricing a slip.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EvError {
    #[error("no {structure} payout configured for {legs} legs")]
    UnsupportedLegCount {
        structure: PayoutStructure,
        legs: usize,
    },
    #[error("leg probability {0} outside [0, 1]")]
    InvalidProbability(f64),
    #[error("hit distribution mass {0} deviates from 1")]
    DistributionMass(f64),
}

/// Probability of exactly `k` hits for every `k` in `0..=probs.len()`.
///
/// Starts from all mass at zero hits; each leg with probability `p`
/// keeps `1 - p` of the mass at `k` and moves `p` of it to `k + 1`.
/// The update runs in place from the top so every leg reads the
/// previous distribution.
///
/// # Errors
/// [`EvError::InvalidProbability`] for a probability outside [0, 1] or
/// NaN, [`EvError::DistributionMass`] if the result does not sum to 1
/// within [`MASS_TOLERANCE`].
pub fn hit_distribution(probs: &[f64]) -> Result<Vec<f64>, EvError> {
    let mut dist = vec![0.0; probs.len() + 1];
    dist[0] = 1.0;

    for (processed, &p) in probs.iter().enumerate() {
        check_probability(p)?;
        for k in (0..=processed).rev() {
            let mass = dist[k];
            dist[k + 1] += mass * p;
            dist[k] = mass * (1.0 - p);
        }
    }

    let total: f64 = dist.iter().sum();
    if (total - 1.0).abs() > MASS_TOLERANCE {
        return Err(EvError::DistributionMass(total));
    }
    Ok(dist)
}

fn check_probability(p: f64) -> Result<(), EvError> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(EvError::InvalidProbability(p))
    }
}

/// Expected-value calculator bound to one payout table.
#[derive(Debug, Clone, Default)]
pub struct EvCalculator {
    table: PayoutTable,
}

impl EvCalculator {
    /// Creates a calculator for the given (already validated) table.
    pub fn new(table: PayoutTable) -> Self {
        Self { table }
    }

    /// The payout table in use.
    pub fn table(&self) -> &PayoutTable {
        &self.table
    }

    /// EV per unit stake for `probs` under `structure`; the leg count is `probs.len()`.
    pub fn ev(&self, structure: PayoutStructure, probs: &[f64]) -> Result<f64, EvError> {
        match structure {
            PayoutStructure::AllHit => self.all_hit(probs),
            PayoutStructure::PartialHit => self.partial_hit(probs),
        }
    }

    /// `Π p × multiplier(n) − 1`.
    pub fn all_hit(&self, probs: &[f64]) -> Result<f64, EvError> {
        let legs = probs.len();
        let multiplier =
            self.table
                .all_hit_multiplier(legs)
                .ok_or(EvError::UnsupportedLegCount {
                    structure: PayoutStructure::AllHit,
                    legs,
                })?;

        let mut joint = 1.0;
        for &p in probs {
            check_probability(p)?;
            joint *= p;
        }
        Ok(joint * multiplier - 1.0)
    }

    /// `Σ_tiers P(hits ∈ tier) × multiplier − 1` over the exact hit distribution.
    pub fn partial_hit(&self, probs: &[f64]) -> Result<f64, EvError> {
        let legs = probs.len();
        let tiers = self
            .table
            .partial_hit_tiers(legs)
            .ok_or(EvError::UnsupportedLegCount {
                structure: PayoutStructure::PartialHit,
                legs,
            })?;

        let dist = hit_distribution(probs)?;
        let payout: f64 = tiers
            .iter()
            .map(|tier| {
                let mass: f64 = tier.hits.iter().filter_map(|&k| dist.get(k)).sum();
                mass * tier.multiplier
            })
            .sum();
        Ok(payout - 1.0)
    }

    /// Per-leg probability at which an ALL_HIT slip of `legs` breaks even
    /// when every leg shares it: `(1 / multiplier)^(1 / legs)`.
    pub fn breakeven_probability(&self, legs: usize) -> Result<f64, EvError> {
        let multiplier =
            self.table
                .all_hit_multiplier(legs)
                .ok_or(EvError::UnsupportedLegCount {
                    structure: PayoutStructure::AllHit,
                    legs,
                })?;
        Ok(multiplier.recip().powf(1.0 / legs as f64))
    }

    /// Fair probability minus breakeven for `legs`.
    pub fn edge(&self, fair_probability: f64, legs: usize) -> Result<f64, EvError> {
        Ok(fair_probability - self.breakeven_probability(legs)?)
    }
}
