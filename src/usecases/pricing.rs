//! Pricing - Augment a Raw Table with Fair Probabilities
//!
//! First core entry point. Every record is checked for both prices,
//! converted and de-vigged. Records that fail are listed as
//! exclusions; one bad record never stops the rest of the table.

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::ev::EvCalculator;
use crate::domain::odds::is_degenerate_pair;
use crate::domain::proposition::{PricedProposition, Proposition, RawProposition};

/// A record kept out of the pool and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exclusion {
  /// Position in the raw table.
  pub row: usize,
  pub player: String,
  pub market: String,
  /// `malformed`, `missing_line`, `missing_side` or `invalid_odds`.
  pub kind: &'static str,
  pub reason: String,
}

/// Outcome of pricing one raw table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PricingReport {
  /// Eligible propositions, in table order.
  pub priced: Vec<PricedProposition>,
  pub excluded: Vec<Exclusion>,
  /// Quotes that fell back to the neutral split.
  pub degenerate: usize,
}

/// Price every record of `raw`.
pub fn price_table(raw: Vec<RawProposition>, calculator: &EvCalculator) -> PricingReport {
  let mut report = PricingReport {
    priced: Vec::with_capacity(raw.len()),
    ..PricingReport::default()
  };

  for (row, record) in raw.into_iter().enumerate() {
    let player = record.player.clone();
    let market = record.market.clone();

    let priced = Proposition::try_from(record)
      .and_then(|prop| PricedProposition::price(prop, calculator));

    match priced {
      Ok(priced) => {
        if is_degenerate_pair(priced.implied_favorable, priced.implied_unfavorable) {
          report.degenerate += 1;
        }
        report.priced.push(priced);
      }
      Err(e) => {
        warn!(row, error = %e, "Proposition excluded");
        report.excluded.push(Exclusion {
          row,
          player,
          market,
          kind: e.kind(),
          reason: e.to_string(),
        });
      }
    }
  }

  debug!(
    priced = report.priced.len(),
    excluded = report.excluded.len(),
    "Table priced"
  );
  report
}

/// Order propositions by edge against the three-leg breakeven, best first.
///
/// The breakeven is one constant for every proposition, so this is the
/// fair-probability order; the sort is stable so equal probabilities
/// keep table order.
pub fn rank_by_edge(priced: &mut [PricedProposition]) {
  priced.sort_by(|a, b| b.fair_probability.total_cmp(&a.fair_probability));
}

#[cfg(test)]
mod tests {
  use super::*;

  fn raw(player: &str, over: Option<i32>, under: Option<i32>) -> RawProposition {
    RawProposition {
      player: player.to_string(),
      team: "MIL".to_string(),
      market: "Rebounds".to_string(),
      line: Some(11.5),
      price_favorable: over,
      price_unfavorable: under,
      group: "MIL@CHI".to_string(),
      malformed: None,
    }
  }

  #[test]
  fn test_bad_rows_excluded_not_fatal() {
    let table = vec![
      raw("A", Some(-150), Some(130)),
      raw("B", None, Some(-110)),
      raw("C", Some(50), Some(-110)),
      raw("D", Some(-110), Some(-110)),
    ];
    let report = price_table(table, &EvCalculator::default());

    assert_eq!(report.priced.len(), 2);
    assert_eq!(report.excluded.len(), 2);
    assert_eq!(report.excluded[0].row, 1);
    assert_eq!(report.excluded[0].kind, "missing_side");
    assert_eq!(report.excluded[1].player, "C");
    assert_eq!(report.excluded[1].kind, "invalid_odds");
    assert_eq!(report.degenerate, 0);
  }

  #[test]
  fn test_unreadable_records_excluded_good_rows_kept() {
    let table = crate::adapters::feeds::parse_table(
      r#"[
        {"player":"A","market":"Points","line":"24.5","over_odds":-150,"under_odds":130},
        {"player":"B","market":"Points","line":{"value":3},"over_odds":-110,"under_odds":-110},
        {"player":"C","market":"Points","over_odds":-110,"under_odds":-110},
        {"player":"D","market":"Points","line":9.5,"over_odds":-125.0,"under_odds":105.0}
      ]"#,
    )
    .unwrap();
    let report = price_table(table, &EvCalculator::default());

    let players: Vec<_> = report.priced.iter().map(|p| p.proposition.player.as_str()).collect();
    assert_eq!(players, vec!["A", "D"]);
    let kinds: Vec<_> = report.excluded.iter().map(|e| (e.row, e.kind)).collect();
    assert_eq!(kinds, vec![(1, "malformed"), (2, "missing_line")]);
    assert_eq!(report.excluded[0].player, "B");
  }

  #[test]
  fn test_every_fair_probability_in_unit_interval() {
    let table = vec![
      raw("A", Some(-10000), Some(3000)),
      raw("B", Some(900), Some(-2500)),
    ];
    for priced in price_table(table, &EvCalculator::default()).priced {
      assert!((0.0..=1.0).contains(&priced.fair_probability));
    }
  }

  #[test]
  fn test_rank_by_edge_is_stable() {
    let table = vec![
      raw("A", Some(-110), Some(-110)),
      raw("B", Some(-150), Some(130)),
      raw("C", Some(-110), Some(-110)),
    ];
    let mut priced = price_table(table, &EvCalculator::default()).priced;
    rank_by_edge(&mut priced);
    let order: Vec<_> = priced.iter().map(|p| p.proposition.player.as_str()).collect();
    assert_eq!(order, vec!["B", "A", "C"]);
  }
}
