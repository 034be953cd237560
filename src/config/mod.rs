//! # Configuration
//!
//! Settings loaded from environment variables with defaults from
//! [`crate::constants`], optionally overridden by command-line flags.
//!
//! - `controller`: controllers, workers, retry policy, datastore and logging
//! - `server`: metrics and probe HTTP server

mod controller;
mod server;

pub use controller::{ConfigOverrides, ControllerConfig, StoreBackend};
pub use server::ServerConfig;

/// Read a setting through `lookup` or return `default`
///
/// Unparseable values fall back to the default.
pub(crate) fn var_or_default<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a setting as a string or return `default`
pub(crate) fn var_or_default_str(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Process environment as a settings source
pub(crate) fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
