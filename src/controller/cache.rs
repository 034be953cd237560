//! # Resource Cache
//!
//! Read side of the watch cache as seen by a controller: point lookups by
//! identity and a barrier that resolves once the initial list has been loaded.

use crate::controller::identity::ResourceIdentity;
use async_trait::async_trait;
use kube::Resource;
use kube_runtime::reflector::{ObjectRef, Store};
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("watch cache writer was dropped before the initial list completed")]
    WriterDropped,
}

/// Consistent point-in-time reads of watched objects
#[async_trait]
pub trait ResourceCache<K>: Send + Sync {
    /// Current snapshot of the object, if it is in the cache
    fn get(&self, identity: &ResourceIdentity) -> Option<Arc<K>>;

    /// Resolve once the cache holds the complete initial list
    async fn wait_synced(&self) -> Result<(), CacheError>;
}

#[async_trait]
impl<K> ResourceCache<K> for Store<K>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    fn get(&self, identity: &ResourceIdentity) -> Option<Arc<K>> {
        let mut obj_ref = ObjectRef::<K>::new(&identity.name);
        if let Some(ns) = &identity.namespace {
            obj_ref = obj_ref.within(ns);
        }
        Store::get(self, &obj_ref)
    }

    async fn wait_synced(&self) -> Result<(), CacheError> {
        self.wait_until_ready()
            .await
            .map_err(|_| CacheError::WriterDropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Node;
    use kube::api::ObjectMeta;
    use kube_runtime::watcher::Event;

    fn node(name: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Node::default()
        }
    }

    #[tokio::test]
    async fn test_store_lookup_by_identity() {
        let (reader, mut writer) = kube_runtime::reflector::store::<Node>();
        writer.apply_watcher_event(&Event::Init);
        writer.apply_watcher_event(&Event::InitApply(node("n1")));
        writer.apply_watcher_event(&Event::InitDone);

        reader.wait_synced().await.unwrap();
        let found = ResourceCache::get(&reader, &ResourceIdentity::cluster("n1")).unwrap();
        assert_eq!(found.metadata.name.as_deref(), Some("n1"));
        assert!(ResourceCache::get(&reader, &ResourceIdentity::cluster("n2")).is_none());
    }

    #[tokio::test]
    async fn test_dropped_writer_fails_sync() {
        let (reader, writer) = kube_runtime::reflector::store::<Node>();
        drop(writer);
        assert_eq!(reader.wait_synced().await, Err(CacheError::WriterDropped));
    }
}
