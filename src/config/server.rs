//! # Server Configuration
//!
//! Settings of the metrics and probe HTTP server.

use super::{env_lookup, var_or_default};
use crate::constants::*;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// How long to wait for the server to bind (seconds)
    pub startup_timeout_secs: u64,
    /// Readiness poll interval while waiting for the server (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            metrics_port: var_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            startup_timeout_secs: var_or_default(
                &lookup,
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            poll_interval_ms: var_or_default(
                &lookup,
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_port_override() {
        let config = ServerConfig::from_lookup(|key| (key == "METRICS_PORT").then(|| "9100".to_string()));
        assert_eq!(config.metrics_port, 9100);
        assert_eq!(config.startup_timeout_secs, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    }
}
