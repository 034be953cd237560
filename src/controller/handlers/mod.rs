//! # Sync Handlers
//!
//! Translation of watched objects into datastore key/value pairs, and the
//! uniform handler that writes them through the [`StoreClient`].
//!
//! - `node`: `Node` → `/nimbess/host/<name>`
//! - `unp`: `UnifiedNetworkPolicy` → `/nimbess/unp/<namespace>/<name>`
//!
//! Handlers never retry. Errors are returned to the controller, which owns
//! the retry policy.

pub mod node;
pub mod unp;

pub use node::NodeTranslator;
pub use unp::UnpTranslator;

use crate::controller::identity::ResourceIdentity;
use crate::store::{StoreClient, StoreError};
use model::key::{Key, KvPair};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors returned by a sync handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The object could not be turned into a key/value pair
    #[error("failed to translate {kind} object: {reason}")]
    Translation { kind: &'static str, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether processing the same item again may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Translation { .. } => false,
            SyncError::Store(e) => e.is_retryable(),
        }
    }

    /// Short label used in logs and metrics
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            SyncError::Translation { .. } => "translation",
            SyncError::Store(e) => e.reason(),
        }
    }
}

/// Pure mapping from one watched kind to datastore keys and values
pub trait Translator: Send + Sync + 'static {
    /// Watched object type
    type Resource: Send + Sync + 'static;

    /// Short kind name used in logs, queue names and metric labels
    fn kind(&self) -> &'static str;

    /// Datastore key owned by the object with this identity
    fn key_for(&self, identity: &ResourceIdentity) -> Arc<dyn Key>;

    /// Key/value pair representing the current state of `obj`
    ///
    /// # Errors
    ///
    /// [`SyncError::Translation`] if the object cannot be encoded.
    fn translate(&self, obj: &Self::Resource) -> Result<KvPair, SyncError>;
}

/// Writes translated objects into the datastore
///
/// Idempotent: replaying an add or delete that already took effect is
/// reported as success.
#[derive(Debug, Clone)]
pub struct SyncHandler<T> {
    translator: T,
    store: StoreClient,
}

impl<T: Translator> SyncHandler<T> {
    pub fn new(translator: T, store: StoreClient) -> Self {
        Self { translator, store }
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    pub fn kind(&self) -> &'static str {
        self.translator.kind()
    }

    /// Create the object's key
    ///
    /// An existing key is left untouched and treated as success.
    ///
    /// # Errors
    ///
    /// Translation and store errors other than [`StoreError::AlreadyExists`].
    pub async fn on_create(&self, obj: &T::Resource) -> Result<(), SyncError> {
        let pair = self.translator.translate(obj)?;
        debug!(kind = self.kind(), key = %pair.key, "Converted object");
        match self.store.create(&pair).await {
            Ok(revision) => {
                info!(kind = self.kind(), key = %pair.key, revision, "Created datastore entry");
                Ok(())
            }
            Err(StoreError::AlreadyExists { path }) => {
                debug!(kind = self.kind(), path = %path, "Datastore entry already exists, nothing to create");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the object's key with its current state, creating it if absent
    ///
    /// # Errors
    ///
    /// Translation and store errors, including revision conflicts.
    pub async fn on_update(&self, obj: &T::Resource) -> Result<(), SyncError> {
        let pair = self.translator.translate(obj)?;
        debug!(kind = self.kind(), key = %pair.key, "Converted object");
        let revision = self.store.update(&pair).await?;
        info!(kind = self.kind(), key = %pair.key, revision, "Updated datastore entry");
        Ok(())
    }

    /// Remove the key owned by `identity`
    ///
    /// A key that is already gone is treated as success.
    ///
    /// # Errors
    ///
    /// Store errors other than [`StoreError::NotFound`].
    pub async fn on_delete(&self, identity: &ResourceIdentity) -> Result<(), SyncError> {
        let key = self.translator.key_for(identity);
        match self.store.delete(key.as_ref()).await {
            Ok(()) => {
                info!(kind = self.kind(), key = %key, "Deleted datastore entry");
                Ok(())
            }
            Err(StoreError::NotFound { path }) => {
                debug!(kind = self.kind(), path = %path, "Datastore entry already absent, nothing to delete");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KvBackend, MemoryBackend};
    use model::prelude::*;

    /// Translator over plain hostnames
    struct HostTranslator;

    impl Translator for HostTranslator {
        type Resource = String;

        fn kind(&self) -> &'static str {
            "host"
        }

        fn key_for(&self, identity: &ResourceIdentity) -> Arc<dyn Key> {
            Arc::new(NodeKey::new(identity.name.clone()))
        }

        fn translate(&self, obj: &String) -> Result<KvPair, SyncError> {
            let node = model::node::Node {
                hostname: obj.clone(),
                ..model::node::Node::default()
            };
            let value = Value::from_record(&node).map_err(|e| SyncError::Translation {
                kind: "host",
                reason: e.to_string(),
            })?;
            Ok(KvPair::new(NodeKey::new(obj.clone()), value))
        }
    }

    fn handler() -> (SyncHandler<HostTranslator>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = StoreClient::new(backend.clone());
        (SyncHandler::new(HostTranslator, store), backend)
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (handler, backend) = handler();
        handler.on_create(&"h1".to_string()).await.unwrap();
        handler.on_create(&"h1".to_string()).await.unwrap();
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (handler, backend) = handler();
        handler.on_create(&"h1".to_string()).await.unwrap();

        let id = ResourceIdentity::cluster("h1");
        handler.on_delete(&id).await.unwrap();
        handler.on_delete(&id).await.unwrap();
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_update_upserts() {
        let (handler, backend) = handler();
        handler.on_update(&"h1".to_string()).await.unwrap();
        handler.on_update(&"h1".to_string()).await.unwrap();
        assert_eq!(backend.len(), 1);
        assert!(backend.get("/nimbess/host/h1").await.unwrap().unwrap().mod_revision > 1);
    }

    #[tokio::test]
    async fn test_missing_identifier_is_not_retryable() {
        let (handler, _) = handler();
        let err = handler.on_create(&String::new()).await.unwrap_err();
        assert_eq!(
            err,
            SyncError::Store(StoreError::InsufficientIdentifier("name".to_string()))
        );
        assert!(!err.is_retryable());
        assert_eq!(err.reason(), "insufficient_identifier");
    }
}
