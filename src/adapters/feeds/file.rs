//! File Feed - JSON Proposition Table on Disk

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use super::parse_table;
use crate::domain::proposition::RawProposition;
use crate::ports::PropositionSource;

/// Reads the whole table from a JSON file on every fetch.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PropositionSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(&self) -> Result<Vec<RawProposition>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let rows = parse_table(&text)?;
        debug!(rows = rows.len(), "Proposition table read");
        Ok(rows)
    }
}
