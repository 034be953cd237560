//! # Reconciliation Controller
//!
//! One controller per watched kind. It waits for the watch cache to finish its
//! initial list, then runs a pool of workers that drain the work queue and
//! hand each item to the kind's [`SyncHandler`].
//!
//! ## Lifecycle
//!
//! `Initializing` → `Syncing` → `Running` → `Draining` → `Stopped`, or
//! `Syncing` → `Failed` when the cache does not sync in time or shutdown is
//! requested first. A failed controller never starts workers.
//!
//! ## Item processing
//!
//! Workers re-read the current object from the cache instead of acting on the
//! state seen when the item was enqueued. An Add or Update for an object that
//! is no longer cached is a no-op. Deletes only need the identity.

use crate::controller::cache::{CacheError, ResourceCache};
use crate::controller::handlers::{SyncError, SyncHandler, Translator};
use crate::controller::identity::{Operation, QueueEvent};
use crate::controller::queue::WorkQueue;
use crate::observability;
use crate::runtime::error_policy::handle_sync_error;
use crate::runtime::wait_for_shutdown;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, Instrument, Level};

/// Observable lifecycle state of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Initializing,
    Syncing,
    Running,
    Draining,
    Stopped,
    Failed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Initializing => "Initializing",
            ControllerState::Syncing => "Syncing",
            ControllerState::Running => "Running",
            ControllerState::Draining => "Draining",
            ControllerState::Stopped => "Stopped",
            ControllerState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("timed out after {timeout:?} waiting for the {kind} cache to sync")]
    CacheSyncTimeout { kind: String, timeout: Duration },

    #[error("{kind} cache failed to sync: {source}")]
    CacheSync {
        kind: String,
        #[source]
        source: CacheError,
    },

    #[error("shutdown requested before the {kind} cache synced")]
    ShutdownBeforeSync { kind: String },
}

/// Per-controller tuning
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Number of concurrent workers
    pub workers: usize,
    /// Deliveries of a failing item before it is dropped
    pub max_retries: u32,
    /// Upper bound on the initial cache sync
    pub cache_sync_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            workers: DEFAULT_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            cache_sync_timeout: Duration::from_secs(DEFAULT_CACHE_SYNC_TIMEOUT_SECS),
        }
    }
}

/// Reconciles one watched kind into the datastore
pub struct ReconcileController<T: Translator> {
    handler: SyncHandler<T>,
    cache: Arc<dyn ResourceCache<T::Resource>>,
    queue: WorkQueue,
    settings: ControllerSettings,
    state: watch::Sender<ControllerState>,
}

impl<T: Translator> fmt::Debug for ReconcileController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconcileController")
            .field("kind", &self.handler.kind())
            .field("settings", &self.settings)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<T: Translator> ReconcileController<T> {
    pub fn new(
        handler: SyncHandler<T>,
        cache: Arc<dyn ResourceCache<T::Resource>>,
        queue: WorkQueue,
        settings: ControllerSettings,
    ) -> Self {
        let (state, _) = watch::channel(ControllerState::Initializing);
        Self {
            handler,
            cache,
            queue,
            settings,
            state,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.handler.kind()
    }

    /// Queue fed by the watch loop
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Subscribe to lifecycle state changes
    pub fn state(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ControllerState) {
        debug!(kind = self.kind(), state = %state, "Controller state changed");
        self.state.send_replace(state);
    }

    /// Run until `shutdown` turns true
    ///
    /// # Errors
    ///
    /// Returns an error, without starting any worker, if the cache does not
    /// sync within the configured timeout or shutdown is requested first.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ControllerError> {
        let kind = self.kind();
        info!(kind, "Starting controller");

        self.set_state(ControllerState::Syncing);
        info!(kind, "Waiting for cache to sync");
        if let Err(e) = self.wait_for_cache_sync(&mut shutdown).await {
            error!(kind, error = %e, "Controller failed to start");
            self.set_state(ControllerState::Failed);
            self.queue.shut_down();
            return Err(e);
        }

        info!(kind, workers = self.settings.workers, "Cache synced, starting workers");
        let mut workers = JoinSet::new();
        for worker in 0..self.settings.workers.max(1) {
            let this = Arc::clone(&self);
            workers.spawn(async move {
                while this.process_next_item().await {}
                debug!(kind = this.kind(), worker, "Worker exited");
            });
        }
        self.set_state(ControllerState::Running);
        observability::metrics::increment_controllers_running();
        info!(kind, "Controller is now running");

        wait_for_shutdown(&mut shutdown).await;

        info!(kind, "Stopping controller, draining queue");
        self.set_state(ControllerState::Draining);
        self.queue.shut_down();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(kind, error = %e, "Worker task failed");
            }
        }
        observability::metrics::decrement_controllers_running();
        self.set_state(ControllerState::Stopped);
        info!(kind, "Controller stopped");
        Ok(())
    }

    async fn wait_for_cache_sync(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ControllerError> {
        let kind = self.kind().to_string();
        let timeout = self.settings.cache_sync_timeout;

        tokio::select! {
            synced = tokio::time::timeout(timeout, self.cache.wait_synced()) => match synced {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(ControllerError::CacheSync { kind, source }),
                Err(_) => Err(ControllerError::CacheSyncTimeout { kind, timeout }),
            },
            () = wait_for_shutdown(shutdown) => {
                Err(ControllerError::ShutdownBeforeSync { kind })
            }
        }
    }

    /// Process one item from the queue
    ///
    /// Returns `false` once the queue is shut down and drained.
    pub async fn process_next_item(&self) -> bool {
        let Some(event) = self.queue.get().await else {
            debug!(kind = self.kind(), "Queue shut down");
            return false;
        };

        let kind = self.kind();
        let span = tracing::span!(
            Level::INFO,
            "controller.process_item",
            kind,
            identity = %event.identity,
            operation = %event.operation
        );

        let started = Instant::now();
        let result = self.sync(&event).instrument(span.clone()).await;
        observability::metrics::observe_sync_duration(kind, started.elapsed().as_secs_f64());

        span.in_scope(|| match result {
            Ok(()) => {
                self.queue.forget(&event.identity);
                observability::metrics::increment_syncs(kind);
                debug!("Successfully synced");
            }
            Err(e) => {
                observability::metrics::increment_sync_errors(kind, e.reason());
                handle_sync_error(&self.queue, &event, &e, self.settings.max_retries);
            }
        });

        self.queue.done(&event.identity);
        true
    }

    async fn sync(&self, event: &QueueEvent) -> Result<(), SyncError> {
        debug!("Syncing item");
        if event.operation == Operation::Delete {
            return self.handler.on_delete(&event.identity).await;
        }

        let Some(obj) = self.cache.get(&event.identity) else {
            info!("Object no longer exists in cache, nothing to sync");
            return Ok(());
        };
        match event.operation {
            Operation::Add => self.handler.on_create(&obj).await,
            Operation::Update => self.handler.on_update(&obj).await,
            Operation::Delete => self.handler.on_delete(&event.identity).await,
        }
    }
}
