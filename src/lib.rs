//! Stargazer Library
//!
//! Watches Kubernetes `Node` and `UnifiedNetworkPolicy` objects and mirrors
//! them into the Nimbess etcd datastore. Each watched kind gets its own watch
//! cache, rate-limited work queue and worker pool.
//!
//! ## Quick Start
//!
//! ```rust
//! use stargazer::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
