//! Error types for key path derivation and value encoding

use thiserror::Error;

/// Errors that can occur while deriving paths or encoding values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// A required identity field is empty
    #[error("insufficient identifiers: missing {name}")]
    InsufficientIdentifier { name: String },

    /// The value could not be encoded or decoded for the key's shape
    #[error("serialization error for {key}: {reason}")]
    Serialization { key: String, reason: String },
}

impl KeyError {
    pub(crate) fn missing(name: &str) -> Self {
        KeyError::InsufficientIdentifier {
            name: name.to_string(),
        }
    }
}
