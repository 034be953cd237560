//! # Observability
//!
//! Observability modules for metrics.
//!
//! - `metrics`: Prometheus metrics collection
//!
//! Logging goes through `tracing`; the subscriber is installed by
//! `runtime::initialization`.

pub mod metrics;

// Re-export for convenience
pub use metrics::*;
