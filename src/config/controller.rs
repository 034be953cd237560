//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{env_lookup, var_or_default, var_or_default_str};
use crate::constants::*;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Datastore implementation to write to
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreBackend {
    /// etcd v3 cluster
    Etcd,
    /// In-process store, for dry runs
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "etcd" => Ok(StoreBackend::Etcd),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Etcd => f.write_str("etcd"),
            StoreBackend::Memory => f.write_str("memory"),
        }
    }
}

/// Controller-level configuration
///
/// All settings have defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Comma-separated controller kinds to run (node, unp)
    pub controllers: String,
    /// Workers of the node controller
    pub node_workers: usize,
    /// Workers of the UnifiedNetworkPolicy controller
    pub unp_workers: usize,
    /// Deliveries of a failing item before it is dropped
    pub max_retries: u32,
    /// Per-item backoff starting value (milliseconds)
    pub backoff_start_ms: u64,
    /// Per-item backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Time allowed for each controller's initial cache sync (seconds)
    pub cache_sync_timeout_secs: u64,
    /// Datastore implementation
    pub store_backend: StoreBackend,
    /// etcd endpoints
    pub etcd_endpoints: Vec<String>,
    /// etcd dial timeout (milliseconds)
    pub etcd_dial_timeout_ms: u64,
}

/// Command-line overrides applied on top of the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub verbose: bool,
    pub controllers: Option<String>,
    pub etcd_endpoints: Option<String>,
    pub store: Option<StoreBackend>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            controllers: DEFAULT_CONTROLLERS.to_string(),
            node_workers: DEFAULT_WORKERS,
            unp_workers: DEFAULT_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            cache_sync_timeout_secs: DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            store_backend: StoreBackend::Etcd,
            etcd_endpoints: split_list(DEFAULT_ETCD_ENDPOINTS),
            etcd_dial_timeout_ms: DEFAULT_ETCD_DIAL_TIMEOUT_MS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let endpoints = lookup("ETCD_ENDPOINTS")
            .or_else(|| lookup("ETCDCTL_ENDPOINTS"))
            .unwrap_or_else(|| DEFAULT_ETCD_ENDPOINTS.to_string());

        Self {
            log_level: var_or_default_str(&lookup, "LOG_LEVEL", "INFO"),
            log_format: var_or_default_str(&lookup, "LOG_FORMAT", "json"),
            controllers: var_or_default_str(&lookup, "CONTROLLERS", DEFAULT_CONTROLLERS),
            node_workers: var_or_default(&lookup, "NODE_WORKERS", DEFAULT_WORKERS),
            unp_workers: var_or_default(&lookup, "UNP_WORKERS", DEFAULT_WORKERS),
            max_retries: var_or_default(&lookup, "MAX_RETRIES", DEFAULT_MAX_RETRIES),
            backoff_start_ms: var_or_default(&lookup, "BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: var_or_default(&lookup, "BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            cache_sync_timeout_secs: var_or_default(
                &lookup,
                "CACHE_SYNC_TIMEOUT_SECS",
                DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            ),
            store_backend: var_or_default(&lookup, "STORE_BACKEND", StoreBackend::Etcd),
            etcd_endpoints: split_list(&endpoints),
            etcd_dial_timeout_ms: var_or_default(
                &lookup,
                "ETCD_DIAL_TIMEOUT_MS",
                DEFAULT_ETCD_DIAL_TIMEOUT_MS,
            ),
        }
    }

    /// Apply command-line overrides
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if overrides.verbose {
            self.log_level = "DEBUG".to_string();
        }
        if let Some(controllers) = overrides.controllers {
            self.controllers = controllers;
        }
        if let Some(endpoints) = overrides.etcd_endpoints {
            self.etcd_endpoints = split_list(&endpoints);
        }
        if let Some(store) = overrides.store {
            self.store_backend = store;
        }
        self
    }

    /// Get backoff start duration
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff max duration
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Get cache sync timeout duration
    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }

    /// Get etcd dial timeout duration
    pub fn etcd_dial_timeout(&self) -> Duration {
        Duration::from_millis(self.etcd_dial_timeout_ms)
    }
}

/// Split a comma-separated list, dropping blank entries
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
