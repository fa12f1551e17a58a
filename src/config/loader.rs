//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, FeedKind};
use crate::domain::search::MAX_POOL_SIZE;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    feed = ?config.feed.kind,
    pool_size = config.search.pool_size,
    exclude_same_group = config.search.exclude_same_group,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - A usable proposition source
/// - Pool sizes within the documented search bound
/// - A consistent payout table
fn validate_config(config: &AppConfig) -> Result<()> {
  // Feed validation
  match config.feed.kind {
    FeedKind::File => anyhow::ensure!(
      config.feed.path.as_deref().is_some_and(|p| !p.is_empty()),
      "File feed requires a non-empty path"
    ),
    FeedKind::Http => anyhow::ensure!(
      config.feed.url.as_deref().is_some_and(|u| !u.is_empty()),
      "HTTP feed requires a non-empty url"
    ),
  }
  anyhow::ensure!(
    config.feed.refresh_seconds > 0,
    "refresh_seconds must be positive"
  );
  anyhow::ensure!(
    config.feed.timeout_seconds > 0,
    "timeout_seconds must be positive"
  );
  anyhow::ensure!(
    config.feed.requests_per_minute > 0,
    "requests_per_minute must be positive"
  );

  // Search validation
  anyhow::ensure!(
    config.search.pool_size > 0 && config.search.pool_size <= MAX_POOL_SIZE,
    "pool_size must be in (0, {}], got {}",
    MAX_POOL_SIZE,
    config.search.pool_size
  );
  anyhow::ensure!(
    config.search.exhaustive_limit > 0
      && config.search.exhaustive_limit <= MAX_POOL_SIZE,
    "exhaustive_limit must be in (0, {}], got {}",
    MAX_POOL_SIZE,
    config.search.exhaustive_limit
  );

  // Payout validation
  config
    .payouts
    .validate()
    .context("Invalid payout table")?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  const MINIMAL: &str = r#"
    [app]
    name = "nba-board"

    [feed]
    kind = "file"
    path = "props.json"
  "#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = parse_config(MINIMAL).unwrap();
    assert_eq!(config.app.log_level, "info");
    assert_eq!(config.feed.min_refetch_gap_seconds, 120);
    assert_eq!(config.feed.refresh_seconds, 180);
    assert_eq!(config.search.pool_size, 32);
    assert!(!config.search.exclude_same_group);
    assert_eq!(config.payouts.all_hit_multiplier(6), Some(37.5));
    assert!(config.metrics.enabled);
  }

  #[test]
  fn test_http_feed_requires_url() {
    let text = MINIMAL.replace("kind = \"file\"", "kind = \"http\"");
    assert!(parse_config(&text).is_err());
  }

  #[test]
  fn test_pool_size_bounded() {
    let text = format!("{MINIMAL}\n[search]\npool_size = 65\n");
    let err = parse_config(&text).unwrap_err();
    assert!(err.to_string().contains("pool_size"));
  }

  #[test]
  fn test_custom_payouts_validated() {
    let text = format!(
      "{MINIMAL}\n[payouts]\nall_hit = [{{ legs = 2, multiplier = 0.5 }}]\npartial_hit = []\n"
    );
    assert!(parse_config(&text).is_err());
  }
}
