//! # Controller
//!
//! Core controller modules.
//!
//! - `identity`: queue tokens (resource identity and operation)
//! - `backoff`: per-item exponential backoff
//! - `queue`: deduplicating, rate-limited work queue
//! - `cache`: read side of the watch cache
//! - `handlers`: translators and the datastore sync handler
//! - `reconciler`: per-kind reconciliation controller and worker pool
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod cache;
pub mod handlers;
pub mod identity;
pub mod queue;
pub mod reconciler;
pub mod server;
