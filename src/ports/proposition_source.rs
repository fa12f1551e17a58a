//! Proposition Source Port - Candidate Table Interface
//!
//! Defines the trait for retrieving the current table of two-sided
//! player propositions. Sources own all blocking I/O; the core only
//! ever sees a complete table.

use async_trait::async_trait;

use crate::domain::proposition::RawProposition;

/// Trait for proposition table providers.
///
/// Implementors fetch from a file, an HTTP relay, or any other store
/// and return the whole table in one piece. A failed fetch must not
/// return a partial table.
#[async_trait]
pub trait PropositionSource: Send + Sync + 'static {
  /// Short label used in logs and metrics.
  fn name(&self) -> &str;

  /// Fetch the full current table.
  async fn fetch(&self) -> anyhow::Result<Vec<RawProposition>>;
}
