//! Node record and host-scoped keys

use crate::errors::KeyError;
use crate::key::{Key, ValueShape};
use crate::KEY_ROOT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Node record as stored in the datastore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "internalip", default, skip_serializing_if = "String::is_empty")]
    pub internal_ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(rename = "podCIDR", default, skip_serializing_if = "String::is_empty")]
    pub pod_cidr: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
}

/// Key for a cluster node, `/nimbess/host/<hostname>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub hostname: String,
}

impl NodeKey {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }
}

impl Key for NodeKey {
    fn default_path(&self) -> Result<String, KeyError> {
        if self.hostname.is_empty() {
            return Err(KeyError::missing("name"));
        }
        Ok(format!("{KEY_ROOT}/host/{}", self.hostname))
    }

    fn value_shape(&self) -> Result<ValueShape, KeyError> {
        Ok(ValueShape::Node)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node(name={})", self.hostname)
    }
}

/// Per-host raw configuration value, `/nimbess/host/<hostname>/config/<name>`
///
/// No controller writes it. It is the reference key for the raw-string value
/// shape, stored as plain UTF-8 without JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostConfigKey {
    pub hostname: String,
    pub name: String,
}

impl HostConfigKey {
    pub fn new(hostname: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            name: name.into(),
        }
    }
}

impl Key for HostConfigKey {
    fn default_path(&self) -> Result<String, KeyError> {
        if self.hostname.is_empty() {
            return Err(KeyError::missing("node"));
        }
        if self.name.is_empty() {
            return Err(KeyError::missing("name"));
        }
        Ok(format!(
            "{KEY_ROOT}/host/{}/config/{}",
            self.hostname, self.name
        ))
    }

    fn value_shape(&self) -> Result<ValueShape, KeyError> {
        Ok(ValueShape::RawString)
    }
}

impl fmt::Display for HostConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostConfig(node={},name={})", self.hostname, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key_path() {
        let key = NodeKey::new("h1");
        assert_eq!(key.default_path().unwrap(), "/nimbess/host/h1");
        assert_eq!(key.default_delete_path().unwrap(), "/nimbess/host/h1");
        assert_eq!(key.value_shape().unwrap(), ValueShape::Node);
        assert_eq!(key.to_string(), "Node(name=h1)");
    }

    #[test]
    fn test_node_key_path_is_deterministic() {
        let a = NodeKey::new("h1").default_path().unwrap();
        let b = NodeKey::new("h1").default_path().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, NodeKey::new("h2").default_path().unwrap());
    }

    #[test]
    fn test_node_key_requires_hostname() {
        let err = NodeKey::new("").default_path().unwrap_err();
        assert_eq!(
            err,
            KeyError::InsufficientIdentifier {
                name: "name".to_string()
            }
        );
        assert!(NodeKey::new("").default_delete_path().is_err());
    }

    #[test]
    fn test_host_config_key_path() {
        let key = HostConfigKey::new("h1", "AsNumber");
        assert_eq!(
            key.default_path().unwrap(),
            "/nimbess/host/h1/config/AsNumber"
        );
        assert!(key.value_shape().unwrap().is_raw());
        assert_eq!(key.to_string(), "HostConfig(node=h1,name=AsNumber)");
    }

    #[test]
    fn test_host_config_key_requires_both_fields() {
        assert!(matches!(
            HostConfigKey::new("", "x").default_path(),
            Err(KeyError::InsufficientIdentifier { name }) if name == "node"
        ));
        assert!(matches!(
            HostConfigKey::new("h1", "").default_path(),
            Err(KeyError::InsufficientIdentifier { name }) if name == "name"
        ));
    }

    #[test]
    fn test_node_record_json_field_names() {
        let mut labels = BTreeMap::new();
        labels.insert("zone".to_string(), "a".to_string());
        let node = Node {
            name: "n1".to_string(),
            internal_ip: "10.0.0.1".to_string(),
            hostname: "n1".to_string(),
            pod_cidr: "10.244.0.0/24".to_string(),
            labels,
            uid: "abc".to_string(),
            ..Node::default()
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "n1",
                "internalip": "10.0.0.1",
                "hostname": "n1",
                "podCIDR": "10.244.0.0/24",
                "labels": {"zone": "a"},
                "uid": "abc"
            })
        );
    }
}
