//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `PropositionSource`: one complete, already-fetched proposition table per cycle

pub mod proposition_source;

pub use proposition_source::PropositionSource;
