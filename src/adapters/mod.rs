//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP client, file I/O, HTTP servers).
//!
//! Adapter categories:
//! - `feeds`: proposition table sources (file, HTTP)
//! - `metrics`: Prometheus metrics export and health checks

pub mod feeds;
pub mod metrics;
