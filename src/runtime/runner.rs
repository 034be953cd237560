//! # Runner
//!
//! Starts one watch loop and one [`ReconcileController`] per enabled kind,
//! publishes readiness and tears everything down on SIGINT/SIGTERM.
//!
//! Readiness is published once every controller has synced its cache and is
//! running. Controllers are independent: a controller that fails to sync is
//! logged and its siblings keep running, but the process never reports ready.

use crate::config::ControllerConfig;
use crate::controller::backoff::ItemBackoff;
use crate::controller::handlers::{NodeTranslator, SyncHandler, Translator, UnpTranslator};
use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::{ControllerSettings, ControllerState, ReconcileController};
use crate::controller::server::ServerState;
use crate::crd::UnifiedNetworkPolicy;
use crate::runtime::watch_loop::run_watch_loop;
use crate::store::{StoreClient, StoreError};
use anyhow::Result;
use k8s_openapi::api::core::v1::Node as K8sNode;
use kube::{Api, Client, Resource};
use kube_runtime::reflector;
use model::prelude::*;
use serde::de::DeserializeOwned;
use std::fmt::{self, Debug};
use std::future::Future;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Watched kinds the runner knows how to reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerKind {
    Node,
    Unp,
}

impl ControllerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ControllerKind::Node => "node",
            ControllerKind::Unp => "unp",
        }
    }

    /// Parse a comma separated list such as `node,unp`
    ///
    /// Unknown names are logged and skipped, duplicates are collapsed.
    pub fn parse_list(list: &str) -> Vec<ControllerKind> {
        let mut kinds = Vec::new();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match name.parse::<ControllerKind>() {
                Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Ok(_) => {}
                Err(e) => warn!(controller = name, "{}", e),
            }
        }
        kinds
    }
}

impl FromStr for ControllerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "node" => Ok(ControllerKind::Node),
            "unp" => Ok(ControllerKind::Unp),
            other => Err(format!("unknown controller '{other}', expected one of: node, unp")),
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns the long-lived tasks of the process
pub struct Runner {
    client: Client,
    store: StoreClient,
    config: ControllerConfig,
    server_state: Arc<ServerState>,
}

impl Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Runner {
    pub fn new(
        client: Client,
        store: StoreClient,
        config: ControllerConfig,
        server_state: Arc<ServerState>,
    ) -> Self {
        Self {
            client,
            store,
            config,
            server_state,
        }
    }

    /// Run every enabled controller until `shutdown_signal` resolves
    ///
    /// # Errors
    ///
    /// Returns an error if no known controller is enabled.
    pub async fn run(self, shutdown_signal: impl Future<Output = ()>) -> Result<()> {
        let kinds = ControllerKind::parse_list(&self.config.controllers);
        if kinds.is_empty() {
            return Err(anyhow::anyhow!(
                "no controllers enabled (CONTROLLERS={:?})",
                self.config.controllers
            ));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        let mut states = Vec::with_capacity(kinds.len());

        for kind in &kinds {
            let state = match kind {
                ControllerKind::Node => self.spawn_controller(
                    Api::<K8sNode>::all(self.client.clone()),
                    NodeTranslator,
                    self.config.node_workers,
                    &mut tasks,
                    &shutdown_rx,
                ),
                ControllerKind::Unp => self.spawn_controller(
                    Api::<UnifiedNetworkPolicy>::all(self.client.clone()),
                    UnpTranslator,
                    self.config.unp_workers,
                    &mut tasks,
                    &shutdown_rx,
                ),
            };
            states.push(state);
        }
        info!(controllers = ?kinds, "Controllers started, waiting for caches to sync");

        let mut shutdown_signal = std::pin::pin!(shutdown_signal);
        let started = tokio::select! {
            all_running = wait_for_controllers(states) => Some(all_running),
            () = &mut shutdown_signal => None,
        };
        match started {
            Some(true) => {
                info!("All controllers running");
                self.server_state.set_ready(true);
                publish_ready_flag(&self.store, true).await;
                shutdown_signal.await;
            }
            Some(false) => {
                error!("One or more controllers failed to start, not reporting ready");
                shutdown_signal.await;
            }
            None => {}
        }
        info!("Shutdown signal received, draining controllers...");

        self.server_state.set_ready(false);
        publish_ready_flag(&self.store, false).await;
        shutdown_tx.send_replace(true);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Controller task panicked");
            }
        }

        info!("All controllers stopped");
        Ok(())
    }

    fn spawn_controller<T>(
        &self,
        api: Api<T::Resource>,
        translator: T,
        workers: usize,
        tasks: &mut JoinSet<()>,
        shutdown: &watch::Receiver<bool>,
    ) -> watch::Receiver<ControllerState>
    where
        T: Translator,
        T::Resource: Resource + Clone + DeserializeOwned + Debug,
        <T::Resource as Resource>::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
    {
        let kind = translator.kind();
        let (reader, writer) = reflector::store::<T::Resource>();
        let queue = WorkQueue::new(
            kind,
            ItemBackoff::new(
                self.config.backoff_start_duration(),
                self.config.backoff_max_duration(),
            ),
        );
        let settings = ControllerSettings {
            workers,
            max_retries: self.config.max_retries,
            cache_sync_timeout: self.config.cache_sync_timeout(),
        };
        let controller = Arc::new(ReconcileController::new(
            SyncHandler::new(translator, self.store.clone()),
            Arc::new(reader),
            queue.clone(),
            settings,
        ));
        let state = controller.state();

        let watch_shutdown = shutdown.clone();
        tasks.spawn(async move {
            if let Err(e) = run_watch_loop(api, writer, queue, watch_shutdown).await {
                error!(kind, error = %e, "Watch loop failed");
            }
        });

        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            if let Err(e) = controller.run(shutdown).await {
                error!(kind, error = %e, "Controller failed");
            }
        });
        state
    }
}

/// Wait until no controller is still initializing or syncing
///
/// Returns `true` only if every controller reached `Running`.
pub async fn wait_for_controllers(states: Vec<watch::Receiver<ControllerState>>) -> bool {
    let mut all_running = true;
    for mut state in states {
        let settled = state
            .wait_for(|s| !matches!(s, ControllerState::Initializing | ControllerState::Syncing))
            .await
            .map(|s| *s);
        match settled {
            Ok(ControllerState::Running) => {}
            Ok(other) => {
                warn!(state = %other, "Controller did not reach Running");
                all_running = false;
            }
            Err(_) => {
                warn!("Controller exited before reporting its state");
                all_running = false;
            }
        }
    }
    all_running
}

/// Record controller readiness under the datastore ready flag
///
/// Failures are logged only; readiness in the datastore is advisory.
pub async fn publish_ready_flag(store: &StoreClient, ready: bool) {
    let pair = KvPair::new(ReadyFlagKey, Value::RawBool(ready));
    match store.update(&pair).await {
        Ok(revision) => info!(ready, revision, "Datastore ready flag updated"),
        Err(StoreError::RevisionMismatch { .. } | StoreError::AlreadyExists { .. }) => {
            warn!(ready, "Ready flag changed concurrently, leaving it as is");
        }
        Err(e) => warn!(ready, error = %e, "Failed to update datastore ready flag"),
    }
}

/// Resolve on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}
