//! # Node Translator
//!
//! Maps a Kubernetes `Node` onto the datastore `Node` record stored under
//! `/nimbess/host/<node name>`.

use super::{SyncError, Translator};
use crate::controller::identity::ResourceIdentity;
use k8s_openapi::api::core::v1::Node as K8sNode;
use model::key::{Key, KvPair, Value};
use model::node::{Node, NodeKey};
use std::sync::Arc;

const HOSTNAME_ADDRESS: &str = "Hostname";
const INTERNAL_IP_ADDRESS: &str = "InternalIP";

#[derive(Debug, Clone, Copy, Default)]
pub struct NodeTranslator;

impl NodeTranslator {
    /// Datastore record for a cluster node
    pub fn record(node: &K8sNode) -> Node {
        let meta = &node.metadata;
        let mut record = Node {
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
            pod_cidr: node
                .spec
                .as_ref()
                .and_then(|s| s.pod_cidr.clone())
                .unwrap_or_default(),
            labels: meta.labels.clone().unwrap_or_default(),
            uid: meta.uid.clone().unwrap_or_default(),
            ..Node::default()
        };

        let addresses = node
            .status
            .as_ref()
            .and_then(|s| s.addresses.as_ref())
            .into_iter()
            .flatten();
        for address in addresses {
            match address.type_.as_str() {
                HOSTNAME_ADDRESS => record.hostname.clone_from(&address.address),
                INTERNAL_IP_ADDRESS => record.internal_ip.clone_from(&address.address),
                _ => {}
            }
        }

        record
    }
}

impl Translator for NodeTranslator {
    type Resource = K8sNode;

    fn kind(&self) -> &'static str {
        "node"
    }

    fn key_for(&self, identity: &ResourceIdentity) -> Arc<dyn Key> {
        Arc::new(NodeKey::new(identity.name.clone()))
    }

    fn translate(&self, node: &K8sNode) -> Result<KvPair, SyncError> {
        let record = Self::record(node);
        let key = NodeKey::new(record.name.clone());
        let value = Value::from_record(&record).map_err(|e| SyncError::Translation {
            kind: "node",
            reason: e.to_string(),
        })?;
        Ok(KvPair::new(key, value))
    }
}
