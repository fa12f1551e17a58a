//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the optimizer's workflows. Each use case is a self-contained
//! operation.
//!
//! Use cases:
//! - `pricing`: Raw table to priced propositions plus exclusions
//! - `optimizer`: Best slip per (structure, n) over a ranked pool
//! - `refresh`: Refetch gate and the periodic cycle driver

pub mod optimizer;
pub mod pricing;
pub mod refresh;

pub use optimizer::{BestResult, Optimizer, ResultSet};
pub use pricing::{price_table, rank_by_edge, Exclusion, PricingReport};
pub use refresh::{run_cycle, CycleReport, RefetchGate, RefreshLoop};
