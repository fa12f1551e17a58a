//! American odds conversion and two-way de-vig.
//!
//! Converts a quoted American price into the probability the book
//! implies for it, then strips the book's margin from a two-sided
//! quote by normalizing the pair so it sums to one.

use thiserror::Error;
use tracing::warn;

/// Errors raised while converting quoted prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OddsError {
    /// American odds strictly between -100 and +100 (including 0) do not exist.
    #[error("invalid American odds {0}: must be >= +100 or <= -100")]
    InvalidOdds(i32),
}

/// Converts American odds into the book's implied win probability.
///
/// - `+130` → 100 / 230 ≈ 0.4348 (underdog)
/// - `-150` → 150 / 250 = 0.6 (favorite)
/// - `+100` and `-100` both map to exactly 0.5
///
/// # Errors
/// Returns [`OddsError::InvalidOdds`] for any price in the open
/// interval (-100, 100).
pub fn implied_probability(odds: i32) -> Result<f64, OddsError> {
    if odds >= 100 {
        let odds = f64::from(odds);
        Ok(100.0 / (odds + 100.0))
    } else if odds <= -100 {
        let risk = f64::from(odds).abs();
        Ok(risk / (risk + 100.0))
    } else {
        Err(OddsError::InvalidOdds(odds))
    }
}

/// Removes the margin from a two-sided quote.
///
/// Returns `(fair_a, fair_b)` proportional to the implied inputs and
/// summing to one. A non-positive (or non-finite) sum cannot be
/// normalized; the neutral split `(0.5, 0.5)` is returned instead and
/// a data-quality warning is logged.
pub fn devig_two_way(implied_a: f64, implied_b: f64) -> (f64, f64) {
    if is_degenerate_pair(implied_a, implied_b) {
        warn!(
            implied_a,
            implied_b,
            kind = "DegenerateDevig",
            "Implied probabilities do not sum to a positive value, using 0.5/0.5"
        );
        return (0.5, 0.5);
    }
    let sum = implied_a + implied_b;
    (implied_a / sum, implied_b / sum)
}

/// Whether a pair of implied probabilities cannot be normalized.
pub fn is_degenerate_pair(implied_a: f64, implied_b: f64) -> bool {
    let sum = implied_a + implied_b;
    !sum.is_finite() || sum <= 0.0
}

/// Bookmaker margin (overround) embedded in a two-sided quote.
///
/// `0.0476` for a standard -110/-110 market.
pub fn overround(implied_a: f64, implied_b: f64) -> f64 {
    implied_a + implied_b - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_money_is_half() {
        assert_eq!(implied_probability(100), Ok(0.5));
        assert_eq!(implied_probability(-100), Ok(0.5));
    }

    #[test]
    fn test_standard_juice() {
        let p = implied_probability(-110).unwrap();
        assert!((p - 0.5238).abs() < 1e-4, "Expected ~0.5238, got {p}");
    }

    #[test]
    fn test_underdog_and_favorite() {
        let dog = implied_probability(130).unwrap();
        let fav = implied_probability(-150).unwrap();
        assert!((dog - 0.434_782_6).abs() < 1e-6);
        assert!((fav - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_zero_and_inner_band_rejected() {
        for odds in [0, 1, -1, 99, -99, 50] {
            assert_eq!(implied_probability(odds), Err(OddsError::InvalidOdds(odds)));
        }
    }

    #[test]
    fn test_devig_scenario() {
        let over = implied_probability(-150).unwrap();
        let under = implied_probability(130).unwrap();
        let (fair_over, fair_under) = devig_two_way(over, under);
        assert!((fair_over - 0.5798).abs() < 1e-4, "got {fair_over}");
        assert!((fair_over + fair_under - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_devig_symmetric_pair() {
        assert_eq!(devig_two_way(0.5238, 0.5238), (0.5, 0.5));
    }

    #[test]
    fn test_devig_degenerate_sum() {
        assert_eq!(devig_two_way(0.0, 0.0), (0.5, 0.5));
        assert_eq!(devig_two_way(-0.2, 0.1), (0.5, 0.5));
        assert_eq!(devig_two_way(f64::NAN, 0.4), (0.5, 0.5));
        assert!(is_degenerate_pair(0.0, 0.0));
        assert!(!is_degenerate_pair(0.6, 0.4348));
    }

    #[test]
    fn test_overround_standard_market() {
        let p = implied_probability(-110).unwrap();
        assert!((overround(p, p) - 0.047_619).abs() < 1e-6);
    }
}
