//! # Resource Identity
//!
//! Queue tokens for watched objects. A queue item carries only the identity
//! and the kind of change; the object itself is re-read from the watch cache
//! when the item is processed.

use kube::Resource;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Namespace and name of a watched object
///
/// String form is `namespace/name`, or just `name` for cluster-scoped objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    pub namespace: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("resource identity has an empty name")]
    EmptyName,

    #[error("invalid resource identity '{0}': expected 'name' or 'namespace/name'")]
    Malformed(String),
}

impl ResourceIdentity {
    /// Identity of a cluster-scoped object
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Identity of a namespaced object
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Identity taken from an object's metadata
    ///
    /// Returns `None` for objects without a name. An empty namespace is
    /// treated as cluster scope.
    pub fn from_resource<K: Resource>(obj: &K) -> Option<Self> {
        let meta = obj.meta();
        let name = meta.name.as_deref().filter(|n| !n.is_empty())?;
        Some(Self {
            namespace: meta.namespace.clone().filter(|ns| !ns.is_empty()),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for ResourceIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            None if s.is_empty() => Err(IdentityError::EmptyName),
            None => Ok(Self::cluster(s)),
            Some((_, name)) if name.is_empty() => Err(IdentityError::EmptyName),
            Some((ns, name)) if ns.is_empty() || name.contains('/') => {
                Err(IdentityError::Malformed(s.to_string()))
            }
            Some((ns, name)) => Ok(Self::namespaced(ns, name)),
        }
    }
}

/// Kind of change observed for an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Update,
    Delete,
}

impl Operation {
    /// Label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Add => "Add",
            Operation::Update => "Update",
            Operation::Delete => "Delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work handed out by the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEvent {
    pub identity: ResourceIdentity,
    pub operation: Operation,
}

impl QueueEvent {
    pub fn new(identity: ResourceIdentity, operation: Operation) -> Self {
        Self {
            identity,
            operation,
        }
    }
}
