//! Scenario Tests — Worked Examples Through the Public API
//!
//! Each test pins one hand-computed number so regressions in the
//! pricing math show up as a concrete mismatch.

use std::collections::BTreeMap;

use prop_ev_optimizer::domain::constraint::ConstraintFilter;
use prop_ev_optimizer::domain::ev::{hit_distribution, EvCalculator};
use prop_ev_optimizer::domain::odds::{devig_two_way, implied_probability, OddsError};
use prop_ev_optimizer::domain::payout::{
    AllHitPayout, PartialHitPayout, PayoutStructure, PayoutTable, PayoutTier,
};
use prop_ev_optimizer::domain::proposition::{PricedProposition, Proposition};
use prop_ev_optimizer::domain::search::{CancelFlag, CombinationSearch};
use prop_ev_optimizer::usecases::Optimizer;

fn close(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

fn leg(player: &str, group: &str, p: f64) -> PricedProposition {
    PricedProposition {
        proposition: Proposition {
            player: player.to_string(),
            team: String::new(),
            market: "Hits".to_string(),
            line: 0.5,
            price_favorable: -110,
            price_unfavorable: -110,
            group: group.to_string(),
        },
        implied_favorable: p,
        implied_unfavorable: 1.0 - p,
        margin: 0.0,
        fair_probability: p,
        edges: BTreeMap::new(),
    }
}

#[test]
fn favorite_and_underdog_devig() {
    let over = implied_probability(-150).unwrap();
    let under = implied_probability(130).unwrap();
    assert!(close(over, 0.6, 1e-12));
    assert!(close(under, 0.4348, 1e-4));

    let (fair, _) = devig_two_way(over, under);
    assert!(close(fair, 0.5798, 1e-4), "fair = {fair}");
}

#[test]
fn zero_odds_is_invalid() {
    assert_eq!(implied_probability(0), Err(OddsError::InvalidOdds(0)));
}

#[test]
fn two_leg_all_hit_slightly_negative() {
    let ev = EvCalculator::default().all_hit(&[0.55, 0.60]).unwrap();
    assert!(close(ev, -0.01, 1e-12), "ev = {ev}");
}

#[test]
fn all_hit_certain_legs_pay_multiplier() {
    let calc = EvCalculator::default();
    assert!(close(calc.all_hit(&[1.0; 4]).unwrap(), 9.0, 1e-12));
    assert_eq!(calc.all_hit(&[1.0, 0.0, 1.0]).unwrap(), -1.0);
}

#[test]
fn three_leg_partial_hit_worked_example() {
    let table = PayoutTable {
        all_hit: vec![AllHitPayout { legs: 3, multiplier: 6.0 }],
        partial_hit: vec![PartialHitPayout {
            legs: 3,
            tiers: vec![
                PayoutTier { hits: vec![3], multiplier: 3.0 },
                PayoutTier { hits: vec![2], multiplier: 1.0 },
            ],
        }],
    };
    let probs = [0.6; 3];

    let dist = hit_distribution(&probs).unwrap();
    assert!(close(dist[3], 0.216, 1e-12));
    assert!(close(dist[2], 0.432, 1e-12));

    let ev = EvCalculator::new(table).partial_hit(&probs).unwrap();
    assert!(close(ev, 0.08, 1e-12), "ev = {ev}");
}

#[test]
fn pool_of_exactly_n_returns_it_or_null() {
    let calc = EvCalculator::default();
    let search = CombinationSearch::new(&calc, ConstraintFilter::new(true));
    let cancel = CancelFlag::new();

    let distinct = vec![leg("A", "G1", 0.6), leg("B", "G2", 0.6), leg("C", "G3", 0.6)];
    let report = search
        .best(&distinct, PayoutStructure::PartialHit, 3, &cancel)
        .unwrap();
    assert_eq!(report.best.unwrap().indices, vec![0, 1, 2]);

    let clashing = vec![leg("A", "G1", 0.6), leg("B", "G2", 0.6), leg("C", "G1", 0.6)];
    let report = search
        .best(&clashing, PayoutStructure::PartialHit, 3, &cancel)
        .unwrap();
    assert!(report.best.is_none());
}

#[test]
fn empty_pool_is_all_null() {
    let set = Optimizer::new(PayoutTable::default())
        .run_blocking(&[], 32, true, &CancelFlag::new())
        .unwrap();
    assert_eq!(set.results.len(), 9);
    assert!(set.is_all_null());
    assert!(set.results.iter().all(|r| r.members.is_none()));
}
