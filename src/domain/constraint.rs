//! Admissibility rules for slip combinations.

use super::proposition::PricedProposition;

/// Decides whether a set of legs may be played together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstraintFilter {
    /// Forbid two legs from the same event.
    pub exclude_same_group: bool,
}

impl ConstraintFilter {
    pub fn new(exclude_same_group: bool) -> Self {
        Self { exclude_same_group }
    }

    /// Whether `members` form an admissible combination.
    ///
    /// The same proposition may never appear twice. With same-event
    /// exclusion on, no two members may share a group id.
    pub fn is_admissible(&self, members: &[&PricedProposition]) -> bool {
        members
            .iter()
            .enumerate()
            .all(|(i, candidate)| self.can_extend(&members[..i], candidate))
    }

    /// Whether `candidate` can join the already admissible `chosen` legs.
    pub fn can_extend(&self, chosen: &[&PricedProposition], candidate: &PricedProposition) -> bool {
        chosen.iter().all(|member| {
            !std::ptr::eq(*member, candidate)
                && !(self.exclude_same_group && member.group() == candidate.group())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::proposition::Proposition;

    fn leg(player: &str, group: &str) -> PricedProposition {
        PricedProposition {
            proposition: Proposition {
                player: player.to_string(),
                team: String::new(),
                market: "Points".to_string(),
                line: 20.5,
                price_favorable: -110,
                price_unfavorable: -110,
                group: group.to_string(),
            },
            implied_favorable: 0.5238,
            implied_unfavorable: 0.5238,
            margin: 0.0476,
            fair_probability: 0.5,
            edges: BTreeMap::new(),
        }
    }

    #[test]
    fn test_exclusion_blocks_shared_group() {
        let a = leg("A", "G1");
        let b = leg("B", "G1");
        let c = leg("C", "G2");
        let filter = ConstraintFilter::new(true);
        assert!(!filter.is_admissible(&[&a, &b]));
        assert!(filter.is_admissible(&[&a, &c]));
        assert!(!filter.can_extend(&[&a, &c], &b));
    }

    #[test]
    fn test_disabled_exclusion_admits_everything_distinct() {
        let a = leg("A", "G1");
        let b = leg("B", "G1");
        let filter = ConstraintFilter::default();
        assert!(filter.is_admissible(&[&a, &b]));
        assert!(filter.is_admissible(&[]));
    }

    #[test]
    fn test_same_leg_twice_never_admissible() {
        let a = leg("A", "G1");
        assert!(!ConstraintFilter::new(false).is_admissible(&[&a, &a]));
    }
}
