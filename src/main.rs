//! # Stargazer
//!
//! Kubernetes controller that keeps the Nimbess datastore in sync with the
//! cluster's `Node` and `UnifiedNetworkPolicy` objects.
//!
//! ## Usage
//!
//! ```bash
//! # Node controller against a local etcd
//! stargazer --etcd-endpoints http://127.0.0.1:2379
//!
//! # Both controllers, dry run against the in-memory datastore
//! stargazer --controllers node,unp --store memory --verbose
//! ```
//!
//! Every flag has an environment variable counterpart, see
//! [`stargazer::config::ControllerConfig`].

use anyhow::Result;
use clap::Parser;
use stargazer::config::{ConfigOverrides, StoreBackend};
use stargazer::runtime::initialization::initialize;
use stargazer::runtime::runner::{shutdown_signal, Runner};

#[derive(Parser, Debug)]
#[command(
    name = "stargazer",
    version,
    about = "Mirror Kubernetes Nodes and UnifiedNetworkPolicies into the Nimbess datastore"
)]
struct Args {
    /// Log at DEBUG level
    #[arg(short, long)]
    verbose: bool,

    /// Comma-separated controllers to run (node, unp)
    #[arg(long, value_name = "KINDS")]
    controllers: Option<String>,

    /// Comma-separated etcd endpoints
    #[arg(long, value_name = "URLS")]
    etcd_endpoints: Option<String>,

    /// Datastore backend
    #[arg(long, value_enum)]
    store: Option<StoreBackend>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let init = initialize(ConfigOverrides {
        verbose: args.verbose,
        controllers: args.controllers,
        etcd_endpoints: args.etcd_endpoints,
        store: args.store,
    })
    .await?;

    Runner::new(
        init.client,
        init.store,
        init.controller_config,
        init.server_state,
    )
    .run(shutdown_signal())
    .await
}
