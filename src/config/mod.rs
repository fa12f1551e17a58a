//! Configuration Module - TOML-based Optimizer Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Payout tables, pool sizing and feed settings are externalized
//! here so boards can change without touching the domain layer.

pub mod hot_reload;
pub mod loader;

use serde::Deserialize;

use crate::domain::payout::PayoutTable;
use crate::domain::search::DEFAULT_EXHAUSTIVE_LIMIT;

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Process identity and logging.
  pub app: AppSection,
  /// Proposition source and refresh cadence.
  pub feed: FeedConfig,
  /// Pool sizing and admissibility rules.
  #[serde(default)]
  pub search: SearchConfig,
  /// Payout schedules; the standard board when omitted.
  #[serde(default)]
  pub payouts: PayoutTable,
  /// Metrics and health endpoints.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Process identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
  /// Human-readable instance name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Where propositions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
  /// JSON array on disk.
  File,
  /// JSON array served over HTTP.
  Http,
}

/// Proposition feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  pub kind: FeedKind,
  /// Path to the JSON table (file feeds).
  #[serde(default)]
  pub path: Option<String>,
  /// Endpoint serving the JSON table (http feeds).
  #[serde(default)]
  pub url: Option<String>,
  /// Request timeout in seconds.
  #[serde(default = "default_timeout")]
  pub timeout_seconds: u64,
  /// Minimum gap between two fetches; failures also restart it.
  #[serde(default = "default_min_refetch_gap")]
  pub min_refetch_gap_seconds: u64,
  /// How often a refresh cycle is attempted.
  #[serde(default = "default_refresh")]
  pub refresh_seconds: u64,
  /// Retries on transient HTTP failures.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Client-side cap on outbound requests, retries included.
  #[serde(default = "default_requests_per_minute")]
  pub requests_per_minute: u32,
}

/// Search configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
  /// Number of top-ranked propositions handed to the search.
  #[serde(default = "default_pool_size")]
  pub pool_size: usize,
  /// Forbid two legs from the same event.
  #[serde(default)]
  pub exclude_same_group: bool,
  /// Pools up to this size are enumerated exhaustively.
  #[serde(default = "default_exhaustive_limit")]
  pub exhaustive_limit: usize,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      pool_size: default_pool_size(),
      exclude_same_group: false,
      exhaustive_limit: default_exhaustive_limit(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable the Prometheus and health servers.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_timeout() -> u64 {
  20
}

fn default_min_refetch_gap() -> u64 {
  120
}

fn default_refresh() -> u64 {
  180
}

fn default_max_retries() -> u32 {
  2
}

fn default_requests_per_minute() -> u32 {
  10
}

fn default_pool_size() -> usize {
  32
}

fn default_exhaustive_limit() -> usize {
  DEFAULT_EXHAUSTIVE_LIMIT
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
