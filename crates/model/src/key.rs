//! Key abstraction, value shapes and value (de)serialization
//!
//! A [`Key`] knows where its value lives in the datastore and what shape that
//! value has. The shape is the single switch between structured (JSON) and raw
//! (bare text) encoding, and it is consulted on both the write path
//! ([`serialize_value`]) and the read path ([`parse_value`]).

use crate::errors::KeyError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A typed datastore key
///
/// Implementations must check every required identity field before building a
/// path and fail with [`KeyError::InsufficientIdentifier`] instead of
/// defaulting. Distinct resources must never produce the same path.
pub trait Key: fmt::Display + fmt::Debug + Send + Sync {
    /// Path under which the value is stored
    fn default_path(&self) -> Result<String, KeyError>;

    /// Path used to delete the value
    ///
    /// For a key that is the parent of other keys this is the common prefix
    /// of the key and its children, so a recursive delete removes both.
    fn default_delete_path(&self) -> Result<String, KeyError> {
        self.default_path()
    }

    /// Shape of the value stored under this key
    fn value_shape(&self) -> Result<ValueShape, KeyError>;
}

/// Shape tag for the value stored under a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueShape {
    /// A `Node` record, JSON encoded
    Node,
    /// A `UnifiedNetworkPolicy` object, JSON encoded
    UnifiedNetworkPolicy,
    /// A bare string, written without quotes
    RawString,
    /// A bare boolean, written as `true` or `false`
    RawBool,
}

impl ValueShape {
    /// Whether values of this shape bypass structured encoding
    #[must_use]
    pub fn is_raw(self) -> bool {
        matches!(self, ValueShape::RawString | ValueShape::RawBool)
    }
}

/// A value as written to or read from the datastore
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Structured(serde_json::Value),
    RawString(String),
    RawBool(bool),
}

impl Value {
    /// Build a structured value from any serializable record
    pub fn from_record<T: Serialize>(record: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(record).map(Value::Structured)
    }

    /// Structured payload, if this is a structured value
    #[must_use]
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Structured(v) => Some(v),
            _ => None,
        }
    }
}

/// A key together with its value and datastore metadata
///
/// Built fresh for each write and only read by the store client.
#[derive(Debug, Clone)]
pub struct KvPair {
    pub key: Arc<dyn Key>,
    pub value: Value,
    /// Mod revision the value was read at, or the revision a conditional
    /// update expects to find
    pub revision: Option<i64>,
    /// For writes, if set, the key expires after this duration
    pub ttl: Option<Duration>,
}

impl KvPair {
    pub fn new(key: impl Key + 'static, value: Value) -> Self {
        Self {
            key: Arc::new(key),
            value,
            revision: None,
            ttl: None,
        }
    }

    #[must_use]
    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = Some(revision);
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Encode a value for storage under `key`
///
/// Raw shapes are written as bare text. Structured shapes are JSON encoded.
/// A value whose variant does not match the key's shape is rejected.
pub fn serialize_value(key: &dyn Key, value: &Value) -> Result<Vec<u8>, KeyError> {
    let shape = key.value_shape()?;
    match (shape, value) {
        (ValueShape::RawString, Value::RawString(s)) => Ok(s.clone().into_bytes()),
        (ValueShape::RawBool, Value::RawBool(b)) => Ok(b.to_string().into_bytes()),
        (ValueShape::Node | ValueShape::UnifiedNetworkPolicy, Value::Structured(v)) => {
            serde_json::to_vec(v).map_err(|e| serialization_error(key, e.to_string()))
        }
        (shape, value) => Err(serialization_error(
            key,
            format!("value {value:?} does not match shape {shape:?}"),
        )),
    }
}

/// Decode bytes read from the datastore under `key`
///
/// This is the inverse of [`serialize_value`].
pub fn parse_value(key: &dyn Key, raw: &[u8]) -> Result<Value, KeyError> {
    match key.value_shape()? {
        ValueShape::RawString => String::from_utf8(raw.to_vec())
            .map(Value::RawString)
            .map_err(|e| serialization_error(key, e.to_string())),
        ValueShape::RawBool => Ok(Value::RawBool(raw == b"true")),
        ValueShape::Node | ValueShape::UnifiedNetworkPolicy => serde_json::from_slice(raw)
            .map(Value::Structured)
            .map_err(|e| serialization_error(key, e.to_string())),
    }
}

fn serialization_error(key: &dyn Key, reason: String) -> KeyError {
    KeyError::Serialization {
        key: key.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{HostConfigKey, Node, NodeKey};
    use crate::ready::ReadyFlagKey;

    #[test]
    fn test_structured_value_is_json() {
        let key = NodeKey::new("h1");
        let node = Node {
            hostname: "h1".to_string(),
            ..Node::default()
        };
        let value = Value::from_record(&node).unwrap();

        let bytes = serialize_value(&key, &value).unwrap();
        assert_eq!(bytes, br#"{"hostname":"h1"}"#);
        assert_eq!(parse_value(&key, &bytes).unwrap(), value);
    }

    #[test]
    fn test_raw_string_bypasses_json() {
        let key = HostConfigKey::new("h1", "AsNumber");
        let bytes = serialize_value(&key, &Value::RawString("64512".to_string())).unwrap();
        assert_eq!(bytes, b"64512");
        assert_eq!(
            parse_value(&key, b"64512").unwrap(),
            Value::RawString("64512".to_string())
        );
    }

    #[test]
    fn test_raw_bool_written_as_text() {
        let key = ReadyFlagKey;
        assert_eq!(serialize_value(&key, &Value::RawBool(true)).unwrap(), b"true");
        assert_eq!(serialize_value(&key, &Value::RawBool(false)).unwrap(), b"false");
        assert_eq!(parse_value(&key, b"true").unwrap(), Value::RawBool(true));
        assert_eq!(parse_value(&key, b"yes").unwrap(), Value::RawBool(false));
    }

    #[test]
    fn test_shape_mismatch_is_serialization_error() {
        let err = serialize_value(&ReadyFlagKey, &Value::Structured(serde_json::json!({})))
            .unwrap_err();
        assert!(matches!(err, KeyError::Serialization { .. }));

        let err = serialize_value(&NodeKey::new("h1"), &Value::RawBool(true)).unwrap_err();
        assert!(matches!(err, KeyError::Serialization { .. }));
    }

    #[test]
    fn test_malformed_structured_bytes_fail_to_parse() {
        let err = parse_value(&NodeKey::new("h1"), b"{not json").unwrap_err();
        assert!(matches!(err, KeyError::Serialization { .. }));
    }

    #[test]
    fn test_kv_pair_builders() {
        let pair = KvPair::new(ReadyFlagKey, Value::RawBool(true))
            .with_revision(7)
            .with_ttl(Duration::from_secs(30));
        assert_eq!(pair.revision, Some(7));
        assert_eq!(pair.ttl, Some(Duration::from_secs(30)));
        assert_eq!(pair.key.to_string(), "ReadyFlag");
    }
}
