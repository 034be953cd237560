//! # Initialization
//!
//! Process startup: rustls setup, tracing, metrics, server startup, datastore
//! backend selection and Kubernetes client setup.

use crate::config::{ConfigOverrides, ControllerConfig, ServerConfig, StoreBackend};
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use crate::store::{EtcdBackend, MemoryBackend, StoreClient};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Everything the runner needs to start the controllers
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Datastore client shared by every controller
    pub store: StoreClient,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Effective controller configuration
    pub controller_config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("controller_config", &self.controller_config)
            .field("server_ready", &self.server_state.is_ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Datastore connection
/// - Kubernetes client creation
pub async fn initialize(overrides: ConfigOverrides) -> Result<InitializationResult> {
    // Must run before any TLS connection is opened
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    let controller_config = ControllerConfig::from_env().with_overrides(overrides);
    init_tracing(&controller_config)?;

    info!("Starting Stargazer");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(config = ?controller_config, "Configuration loaded");

    observability::metrics::register_metrics()?;

    let server_config = ServerConfig::from_env();
    let server_state = Arc::new(ServerState::default());

    let server_state_clone = server_state.clone();
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let store = connect_store(&controller_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    info!("Controller initialized, starting controllers...");

    Ok(InitializationResult {
        client,
        store,
        server_state,
        controller_config,
    })
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `LOG_LEVEL`. `LOG_FORMAT=text` selects human readable
/// output, anything else emits JSON lines.
fn init_tracing(config: &ControllerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let result = if config.log_format.eq_ignore_ascii_case("text") {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))
}

/// Filter directives for our own crates at the given level
pub(crate) fn default_directives(level: &str) -> String {
    let level = match level.to_ascii_lowercase().as_str() {
        lvl @ ("error" | "warn" | "info" | "debug" | "trace") => lvl.to_string(),
        _ => "info".to_string(),
    };
    format!("stargazer={level},model={level}")
}

/// Build the datastore client for the configured backend
///
/// # Errors
///
/// Fails if the etcd endpoints cannot be reached within the dial timeout.
pub async fn connect_store(config: &ControllerConfig) -> Result<StoreClient> {
    match config.store_backend {
        StoreBackend::Etcd => {
            let backend = EtcdBackend::connect(&config.etcd_endpoints, config.etcd_dial_timeout())
                .await
                .with_context(|| {
                    format!("Failed to connect to etcd at {:?}", config.etcd_endpoints)
                })?;
            info!(endpoints = ?config.etcd_endpoints, "Connected to etcd");
            Ok(StoreClient::new(Arc::new(backend)))
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory datastore, nothing will be persisted");
            Ok(StoreClient::new(Arc::new(MemoryBackend::new())))
        }
    }
}

/// Wait for the HTTP server to bind
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_serving.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives("DEBUG"), "stargazer=debug,model=debug");
        assert_eq!(default_directives("info"), "stargazer=info,model=info");
        assert_eq!(default_directives("loud"), "stargazer=info,model=info");
    }

    #[tokio::test]
    async fn test_connect_memory_store() {
        let config = ControllerConfig {
            store_backend: StoreBackend::Memory,
            ..ControllerConfig::default()
        };
        assert!(connect_store(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_etcd_without_endpoints_fails() {
        let config = ControllerConfig {
            store_backend: StoreBackend::Etcd,
            etcd_endpoints: Vec::new(),
            ..ControllerConfig::default()
        };
        let err = connect_store(&config).await.unwrap_err();
        assert!(err.to_string().contains("Failed to connect to etcd"));
    }

    #[tokio::test]
    async fn test_wait_for_server_ready_times_out() {
        let state = Arc::new(ServerState::default());
        let handle = tokio::spawn(std::future::pending::<()>());
        let config = ServerConfig {
            startup_timeout_secs: 0,
            poll_interval_ms: 1,
            ..ServerConfig::default()
        };
        let err = wait_for_server_ready(&state, &handle, &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to become ready"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_wait_for_server_ready_once_serving() {
        let state = Arc::new(ServerState::default());
        state.is_serving.store(true, Ordering::Relaxed);
        let handle = tokio::spawn(std::future::pending::<()>());
        let config = ServerConfig::default();
        assert!(wait_for_server_ready(&state, &handle, &config).await.is_ok());
        handle.abort();
    }
}
