//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default per-item backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 5;

/// Default per-item backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 1_000_000;

/// Default number of deliveries of a failing item before it is dropped
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default time allowed for a controller's cache to finish its initial list (seconds)
pub const DEFAULT_CACHE_SYNC_TIMEOUT_SECS: u64 = 60;

/// Default worker count per controller
pub const DEFAULT_WORKERS: usize = 1;

/// Controllers enabled when `CONTROLLERS` is not set
pub const DEFAULT_CONTROLLERS: &str = "node";

/// Default etcd endpoint
pub const DEFAULT_ETCD_ENDPOINTS: &str = "http://127.0.0.1:52379";

/// Default etcd dial timeout (milliseconds)
pub const DEFAULT_ETCD_DIAL_TIMEOUT_MS: u64 = 1000;
