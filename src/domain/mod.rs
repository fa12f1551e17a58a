//! Domain layer - Pricing math and slip search.
//!
//! Pure logic with no I/O: odds conversion, de-vig, payout tables,
//! expected value and the combination search. Everything here is
//! deterministic and testable in isolation.

pub mod constraint;
pub mod ev;
pub mod odds;
pub mod payout;
pub mod proposition;
pub mod search;

pub use constraint::ConstraintFilter;
pub use ev::{hit_distribution, EvCalculator, EvError};
pub use odds::{devig_two_way, implied_probability, OddsError};
pub use payout::{PayoutStructure, PayoutTable};
pub use proposition::{PricedProposition, Proposition, PropositionError, RawProposition};
pub use search::{CancelFlag, Candidate, CombinationSearch, SearchError, SearchMode, SearchReport};
