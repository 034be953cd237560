//! # Store Client
//!
//! Conditional write protocol over a [`KvBackend`].
//!
//! - `create`: put only if the path has no prior modification
//! - `delete`: delete only if the path currently exists
//! - `update`: put only if the path is still at the revision last observed
//!
//! Each operation is one transaction, so a failed precondition never leaves a
//! partial write behind.

use super::{Compare, KvBackend, StoreError, Txn, TxnOp};
use crate::observability::metrics;
use model::key::{parse_value, serialize_value, Key, KvPair};
use std::sync::Arc;
use tracing::{debug, warn};

/// Transactional client for the Nimbess datastore
#[derive(Clone)]
pub struct StoreClient {
    backend: Arc<dyn KvBackend>,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient").finish_non_exhaustive()
    }
}

impl StoreClient {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Create the key only if it does not exist yet
    ///
    /// # Errors
    ///
    /// [`StoreError::AlreadyExists`] if the key is present, key and
    /// serialization errors before anything is sent, transport errors from the
    /// backend.
    pub async fn create(&self, pair: &KvPair) -> Result<i64, StoreError> {
        debug!(key = %pair.key, value = ?pair.value, "Create request");
        let (path, value) = encode(pair)?;

        let txn = Txn::when(Compare::not_found(&path)).and_then(TxnOp::Put {
            path: path.clone(),
            value,
            ttl: pair.ttl,
        });
        let outcome = self.backend.txn(txn).await;
        let result = match outcome {
            Ok(o) if o.succeeded => Ok(o.revision),
            Ok(_) => Err(StoreError::AlreadyExists { path }),
            Err(e) => Err(e),
        };
        record("create", &result);
        result
    }

    /// Delete the key only if it currently exists
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the key is absent, including when it was
    /// removed concurrently.
    pub async fn delete(&self, key: &dyn Key) -> Result<(), StoreError> {
        debug!(key = %key, "Delete request");
        let path = key.default_delete_path()?;

        let txn = Txn::when(Compare::found(&path))
            .and_then(TxnOp::Delete { path: path.clone() })
            .or_else(TxnOp::Get { path: path.clone() });
        let result = match self.backend.txn(txn).await {
            Ok(o) if o.succeeded => Ok(()),
            Ok(_) => Err(StoreError::NotFound { path }),
            Err(e) => Err(e),
        };
        record("delete", &result);
        result
    }

    /// Overwrite the key only if nobody wrote it since it was observed
    ///
    /// The expected revision is `pair.revision` when set, otherwise the
    /// current revision is read first. An absent key is created.
    ///
    /// # Errors
    ///
    /// [`StoreError::RevisionMismatch`] if the key moved past the expected
    /// revision, [`StoreError::AlreadyExists`] if an absent key appeared
    /// before it could be created.
    pub async fn update(&self, pair: &KvPair) -> Result<i64, StoreError> {
        debug!(key = %pair.key, value = ?pair.value, "Update request");
        let (path, value) = encode(pair)?;

        let expected = match pair.revision {
            Some(revision) => revision,
            None => match self.backend.get(&path).await {
                Ok(current) => current.map_or(0, |c| c.mod_revision),
                Err(e) => {
                    let result = Err(e);
                    record("update", &result);
                    return result;
                }
            },
        };

        let compare = if expected == 0 {
            Compare::not_found(&path)
        } else {
            Compare::at_revision(&path, expected)
        };
        let txn = Txn::when(compare).and_then(TxnOp::Put {
            path: path.clone(),
            value,
            ttl: pair.ttl,
        });

        let result = match self.backend.txn(txn).await {
            Ok(o) if o.succeeded => Ok(o.revision),
            Ok(_) if expected == 0 => Err(StoreError::AlreadyExists { path }),
            Ok(_) => Err(StoreError::RevisionMismatch { path, expected }),
            Err(e) => Err(e),
        };
        record("update", &result);
        result
    }

    /// Read the key and decode its value according to the key's shape
    ///
    /// # Errors
    ///
    /// Key, transport and decoding errors.
    pub async fn get(&self, key: Arc<dyn Key>) -> Result<Option<KvPair>, StoreError> {
        let path = key.default_path()?;
        let Some(stored) = self.backend.get(&path).await? else {
            return Ok(None);
        };
        let value = parse_value(key.as_ref(), &stored.value)?;
        Ok(Some(KvPair {
            key,
            value,
            revision: Some(stored.mod_revision),
            ttl: None,
        }))
    }
}

fn encode(pair: &KvPair) -> Result<(String, Vec<u8>), StoreError> {
    let path = pair.key.default_path().inspect_err(|e| {
        warn!(key = %pair.key, error = %e, "Failed to convert model key to datastore path");
    })?;
    let value = serialize_value(pair.key.as_ref(), &pair.value).inspect_err(|e| {
        warn!(key = %pair.key, error = %e, "Failed to serialize value");
    })?;
    Ok((path, value))
}

fn record<T>(operation: &str, result: &Result<T, StoreError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.reason(),
    };
    metrics::increment_store_operations(operation, outcome);
}
