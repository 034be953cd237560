//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use stargazer::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Controller building blocks
pub use crate::controller::backoff::ItemBackoff;
pub use crate::controller::cache::{CacheError, ResourceCache};
pub use crate::controller::handlers::{
    node::NodeTranslator, unp::UnpTranslator, SyncError, SyncHandler, Translator,
};
pub use crate::controller::identity::{Operation, QueueEvent, ResourceIdentity};
pub use crate::controller::queue::WorkQueue;
pub use crate::controller::reconciler::{
    ControllerError, ControllerSettings, ControllerState, ReconcileController,
};

// Datastore
pub use crate::store::{KvBackend, MemoryBackend, StoreClient, StoreError};

// Config types
pub use crate::config::{ConfigOverrides, ControllerConfig, ServerConfig, StoreBackend};
