//! Unified network policy keys

use crate::errors::KeyError;
use crate::key::{Key, ValueShape};
use crate::KEY_ROOT;
use std::fmt;

/// Key for a unified network policy, `/nimbess/unp/<name>`
///
/// Policies are namespaced, so `name` is the `namespace/name` identity of the
/// policy object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnpKey {
    pub name: String,
}

impl UnpKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Key for UnpKey {
    fn default_path(&self) -> Result<String, KeyError> {
        if self.name.is_empty() {
            return Err(KeyError::missing("name"));
        }
        Ok(format!("{KEY_ROOT}/unp/{}", self.name))
    }

    fn value_shape(&self) -> Result<ValueShape, KeyError> {
        Ok(ValueShape::UnifiedNetworkPolicy)
    }
}

impl fmt::Display for UnpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UNP(name={})", self.name)
    }
}
