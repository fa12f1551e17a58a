//! Proposition types flowing through a refresh cycle.
//!
//! `RawProposition` is what a source hands over (fields may be missing
//! or unreadable), `Proposition` is an eligible two-sided quote, and
//! `PricedProposition` adds the de-vigged fair probability and per-size edges. All three are
//! rebuilt every cycle and never mutated afterwards.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::ev::EvCalculator;
use super::odds::{devig_two_way, implied_probability, overround, OddsError};
use super::payout::PayoutStructure;

/// Identifier of the event a proposition belongs to.
pub type GroupId = String;

/// Which side of a two-sided quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The side being played (the "over").
    Favorable,
    /// The opposing side (the "under").
    Unfavorable,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Favorable => write!(f, "favorable"),
            Self::Unfavorable => write!(f, "unfavorable"),
        }
    }
}

/// Reasons a proposition is kept out of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropositionError {
    #[error("{player} {market}: unreadable record: {reason}")]
    Malformed {
        player: String,
        market: String,
        reason: String,
    },
    #[error("{player} {market}: missing line")]
    MissingLine { player: String, market: String },
    #[error("{player} {market}: missing {side} price")]
    MissingSide {
        player: String,
        market: String,
        side: Side,
    },
    #[error("{player} {market}: {side} price rejected: {source}")]
    InvalidOdds {
        player: String,
        market: String,
        side: Side,
        #[source]
        source: OddsError,
    },
}

impl PropositionError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "malformed",
            Self::MissingLine { .. } => "missing_line",
            Self::MissingSide { .. } => "missing_side",
            Self::InvalidOdds { .. } => "invalid_odds",
        }
    }
}

/// One input record as delivered by a proposition source.
///
/// Accepts the `over_odds` / `under_odds` / `game` column names as aliases,
/// lines given as numeric strings and prices given as whole-valued floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProposition {
    pub player: String,
    #[serde(default)]
    pub team: String,
    pub market: String,
    #[serde(default, deserialize_with = "lenient_line")]
    pub line: Option<f64>,
    #[serde(default, alias = "over_odds", deserialize_with = "lenient_price")]
    pub price_favorable: Option<i32>,
    #[serde(default, alias = "under_odds", deserialize_with = "lenient_price")]
    pub price_unfavorable: Option<i32>,
    #[serde(default, alias = "game")]
    pub group: GroupId,
    /// Why the source could not read this record, if it could not.
    #[serde(skip)]
    pub malformed: Option<String>,
}

impl RawProposition {
    /// Placeholder for a record that could not be read, kept so the
    /// rejection shows up next to the rest of the table.
    pub fn malformed(player: String, market: String, reason: String) -> Self {
        Self {
            player,
            team: String::new(),
            market,
            line: None,
            price_favorable: None,
            price_unfavorable: None,
            group: GroupId::new(),
            malformed: Some(reason),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// Number, numeric string, or blank.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = match Option::<NumberOrText>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(NumberOrText::Number(v)) => v,
        Some(NumberOrText::Text(text)) if text.trim().is_empty() => return Ok(None),
        Some(NumberOrText::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("{text:?} is not a number")))?,
    };
    if value.is_finite() {
        Ok(Some(value))
    } else {
        Err(D::Error::custom(format!("{value} is not a finite number")))
    }
}

fn lenient_line<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    lenient_number(deserializer)
}

fn lenient_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
    let Some(value) = lenient_number(deserializer)? else {
        return Ok(None);
    };
    if value.fract() != 0.0 || value.abs() > f64::from(i32::MAX) {
        return Err(D::Error::custom(format!(
            "{value} is not a whole American price"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(Some(value as i32))
}

/// A proposition with both prices present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposition {
    pub player: String,
    pub team: String,
    pub market: String,
    pub line: f64,
    pub price_favorable: i32,
    pub price_unfavorable: i32,
    pub group: GroupId,
}

impl TryFrom<RawProposition> for Proposition {
    type Error = PropositionError;

    fn try_from(raw: RawProposition) -> Result<Self, Self::Error> {
        if let Some(reason) = raw.malformed {
            return Err(PropositionError::Malformed {
                player: raw.player,
                market: raw.market,
                reason,
            });
        }
        let line = raw.line.ok_or_else(|| PropositionError::MissingLine {
            player: raw.player.clone(),
            market: raw.market.clone(),
        })?;
        let missing = |side| PropositionError::MissingSide {
            player: raw.player.clone(),
            market: raw.market.clone(),
            side,
        };
        let price_favorable = raw.price_favorable.ok_or_else(|| missing(Side::Favorable))?;
        let price_unfavorable = raw
            .price_unfavorable
            .ok_or_else(|| missing(Side::Unfavorable))?;

        Ok(Self {
            player: raw.player,
            team: raw.team,
            market: raw.market,
            line,
            price_favorable,
            price_unfavorable,
            group: raw.group,
        })
    }
}

/// A proposition with its fair win probability attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedProposition {
    #[serde(flatten)]
    pub proposition: Proposition,
    /// Vigged probability implied by the favorable price.
    pub implied_favorable: f64,
    /// Vigged probability implied by the unfavorable price.
    pub implied_unfavorable: f64,
    /// Book margin carried by the quote.
    pub margin: f64,
    /// De-vigged probability that the favorable side wins.
    pub fair_probability: f64,
    /// Fair probability minus ALL_HIT breakeven, keyed by leg count.
    pub edges: BTreeMap<usize, f64>,
}

impl PricedProposition {
    /// Converts both prices, de-vigs the pair and computes per-size edges.
    ///
    /// # Errors
    /// [`PropositionError::InvalidOdds`] if either price is not a valid
    /// American price.
    pub fn price(
        proposition: Proposition,
        calculator: &EvCalculator,
    ) -> Result<Self, PropositionError> {
        let implied = |side: Side, odds: i32| {
            implied_probability(odds).map_err(|source| PropositionError::InvalidOdds {
                player: proposition.player.clone(),
                market: proposition.market.clone(),
                side,
                source,
            })
        };
        let implied_favorable = implied(Side::Favorable, proposition.price_favorable)?;
        let implied_unfavorable = implied(Side::Unfavorable, proposition.price_unfavorable)?;
        let (fair_probability, _) = devig_two_way(implied_favorable, implied_unfavorable);

        let edges = calculator
            .table()
            .leg_counts(PayoutStructure::AllHit)
            .into_iter()
            .filter_map(|legs| {
                calculator
                    .edge(fair_probability, legs)
                    .ok()
                    .map(|edge| (legs, edge))
            })
            .collect();

        Ok(Self {
            proposition,
            implied_favorable,
            implied_unfavorable,
            margin: overround(implied_favorable, implied_unfavorable),
            fair_probability,
            edges,
        })
    }

    /// Event this proposition belongs to.
    pub fn group(&self) -> &str {
        &self.proposition.group
    }

    /// Edge against the ALL_HIT breakeven for `legs`, if that size is offered.
    pub fn edge(&self, legs: usize) -> Option<f64> {
        self.edges.get(&legs).copied()
    }
}
