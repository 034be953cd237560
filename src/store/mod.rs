//! # Store
//!
//! Transactional access to the Nimbess key-value datastore.
//!
//! - `client`: [`StoreClient`], the conditional create/update/delete protocol
//! - `etcd`: etcd v3 backend
//! - `memory`: in-process backend with the same transactional semantics
//!
//! Every write goes through a single [`Txn`]: one comparison against the
//! current mod revision of a path, then either the success or the failure
//! operations, applied atomically by the backend. A mod revision of 0 means the
//! path does not exist.

pub mod client;
pub mod etcd;
pub mod memory;

pub use client::StoreClient;
pub use etcd::EtcdBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;
use model::errors::KeyError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the store client and its backends
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A required identity field of the key is empty
    #[error("insufficient identifiers: missing {0}")]
    InsufficientIdentifier(String),

    /// The value does not match the key's shape or could not be encoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Conditional create found the key already present
    #[error("key already exists: {path}")]
    AlreadyExists { path: String },

    /// Conditional delete found the key absent
    #[error("key not found: {path}")]
    NotFound { path: String },

    /// Conditional update found the key at a different revision
    #[error("revision mismatch for {path}: expected {expected}")]
    RevisionMismatch { path: String, expected: i64 },

    /// The datastore could not be reached or rejected the request
    #[error("datastore transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// Whether retrying the same operation later may succeed
    ///
    /// Precondition failures are retryable because a concurrent actor may
    /// have converged the state in the meantime.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::InsufficientIdentifier(_) | StoreError::Serialization(_) => false,
            StoreError::AlreadyExists { .. }
            | StoreError::NotFound { .. }
            | StoreError::RevisionMismatch { .. }
            | StoreError::Transport(_) => true,
        }
    }

    /// Short label used in logs and metrics
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            StoreError::InsufficientIdentifier(_) => "insufficient_identifier",
            StoreError::Serialization(_) => "serialization",
            StoreError::AlreadyExists { .. } => "already_exists",
            StoreError::NotFound { .. } => "not_found",
            StoreError::RevisionMismatch { .. } => "revision_mismatch",
            StoreError::Transport(_) => "transport",
        }
    }
}

impl From<KeyError> for StoreError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::InsufficientIdentifier { name } => StoreError::InsufficientIdentifier(name),
            KeyError::Serialization { .. } => StoreError::Serialization(err.to_string()),
        }
    }
}

/// Comparison operator applied to a path's mod revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
}

/// Guard of a transaction: `mod_revision(path) <op> revision`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compare {
    pub path: String,
    pub op: CompareOp,
    pub revision: i64,
}

impl Compare {
    /// The path has never been written (or was deleted)
    pub fn not_found(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            op: CompareOp::Equal,
            revision: 0,
        }
    }

    /// The path currently holds a value
    pub fn found(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            op: CompareOp::NotEqual,
            revision: 0,
        }
    }

    /// The path was last written at exactly `revision`
    pub fn at_revision(path: impl Into<String>, revision: i64) -> Self {
        Self {
            path: path.into(),
            op: CompareOp::Equal,
            revision,
        }
    }

    pub(crate) fn holds(&self, mod_revision: i64) -> bool {
        match self.op {
            CompareOp::Equal => mod_revision == self.revision,
            CompareOp::NotEqual => mod_revision != self.revision,
        }
    }
}

/// A single operation inside a transaction branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Put {
        path: String,
        value: Vec<u8>,
        ttl: Option<Duration>,
    },
    Delete {
        path: String,
    },
    Get {
        path: String,
    },
}

/// A compare-then-act transaction against a single path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Txn {
    pub compare: Compare,
    pub success: Vec<TxnOp>,
    pub failure: Vec<TxnOp>,
}

impl Txn {
    pub fn when(compare: Compare) -> Self {
        Self {
            compare,
            success: Vec::new(),
            failure: Vec::new(),
        }
    }

    #[must_use]
    pub fn and_then(mut self, op: TxnOp) -> Self {
        self.success.push(op);
        self
    }

    #[must_use]
    pub fn or_else(mut self, op: TxnOp) -> Self {
        self.failure.push(op);
        self
    }
}

/// A value read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub value: Vec<u8>,
    pub mod_revision: i64,
}

/// Result of a committed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnOutcome {
    /// Whether the comparison held and the success branch was applied
    pub succeeded: bool,
    /// Store revision after the transaction
    pub revision: i64,
    /// Values returned by `Get` operations of the executed branch
    pub reads: Vec<StoredValue>,
}

/// Backend seam for the datastore
///
/// Implementations must evaluate the comparison and apply the chosen branch as
/// one atomic step against the latest committed state, and must be safe to
/// share across workers.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Commit a transaction
    async fn txn(&self, txn: Txn) -> Result<TxnOutcome, StoreError>;

    /// Read the current value of a path
    async fn get(&self, path: &str) -> Result<Option<StoredValue>, StoreError>;
}
