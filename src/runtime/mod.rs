//! # Runtime
//!
//! Process-level plumbing around the controllers.
//!
//! - `initialization`: logging, rustls, metrics server, datastore and Kubernetes clients
//! - `runner`: starts one controller per enabled kind and handles shutdown
//! - `watch_loop`: watcher stream → cache and work queue
//! - `error_policy`: retry decisions for failed items

pub mod error_policy;
pub mod initialization;
pub mod runner;
pub mod watch_loop;

use tokio::sync::watch;
use tracing::debug;

/// Resolve once shutdown is signalled or the signalling side is gone
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        debug!("Shutdown sender dropped");
    }
}
