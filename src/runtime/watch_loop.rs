//! # Watch Loop
//!
//! Drives a `kube-runtime` watcher stream into the reflector cache and turns
//! every notification into a [`QueueEvent`] for the kind's work queue.
//!
//! The operation is decided against the cache *before* the event is applied:
//!
//! - an object not yet cached is an `Add`
//! - a cached object whose `resourceVersion` changed is an `Update`; resyncs
//!   with an unchanged version are dropped
//! - a deletion is a `Delete`
//! - after a re-list, cached objects missing from the new list are `Delete`s
//!
//! Items are only enqueued once the writer has applied the event, so a worker
//! always finds the object it was handed. Re-list items are held until
//! `InitDone`, when the reflector publishes the new list.
//!
//! The loop only enqueues; it never blocks on datastore work.

use crate::controller::identity::{Operation, QueueEvent, ResourceIdentity};
use crate::controller::queue::WorkQueue;
use crate::observability;
use crate::runtime::wait_for_shutdown;
use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use kube::Resource;
use kube_runtime::reflector::store::Writer;
use kube_runtime::reflector::{ObjectRef, Store};
use kube_runtime::watcher::{self, Event};
use kube_runtime::WatchStreamExt;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

/// Maps watcher events to queue events using the pre-event cache state
#[derive(Debug, Default)]
pub struct EventMapper {
    /// Identities seen since the last `Init`
    relisted: HashSet<ResourceIdentity>,
    /// Re-list items waiting for `InitDone`
    pending: Vec<QueueEvent>,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue events for `event`, given the cache before the event is applied
    ///
    /// The result must be enqueued after the event reaches the writer.
    /// `InitApply` items are held back and returned with `InitDone`.
    pub fn map<K>(&mut self, event: &Event<K>, cache: &Store<K>) -> Vec<QueueEvent>
    where
        K: Resource + Clone + 'static,
        K::DynamicType: Default + Eq + Hash + Clone,
    {
        match event {
            Event::Apply(obj) => changed(obj, cache).into_iter().collect(),
            Event::Delete(obj) => ResourceIdentity::from_resource(obj)
                .map(|id| QueueEvent::new(id, Operation::Delete))
                .into_iter()
                .collect(),
            Event::Init => {
                self.relisted.clear();
                self.pending.clear();
                Vec::new()
            }
            Event::InitApply(obj) => {
                if let Some(id) = ResourceIdentity::from_resource(obj) {
                    self.relisted.insert(id);
                }
                self.pending.extend(changed(obj, cache));
                Vec::new()
            }
            Event::InitDone => {
                let mut ready = std::mem::take(&mut self.pending);
                ready.extend(
                    cache
                        .state()
                        .iter()
                        .filter_map(|obj| ResourceIdentity::from_resource(obj.as_ref()))
                        .filter(|id| !self.relisted.contains(id))
                        .map(|id| QueueEvent::new(id, Operation::Delete)),
                );
                self.relisted.clear();
                ready
            }
        }
    }
}

/// Add or Update for an applied object, `None` if nothing changed
fn changed<K>(obj: &K, cache: &Store<K>) -> Option<QueueEvent>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    let identity = ResourceIdentity::from_resource(obj)?;
    match cache.get(&ObjectRef::from_obj(obj)) {
        None => Some(QueueEvent::new(identity, Operation::Add)),
        Some(cached) => {
            let old = cached.meta().resource_version.as_deref();
            let new = obj.meta().resource_version.as_deref();
            if old.is_some() && old == new {
                None
            } else {
                Some(QueueEvent::new(identity, Operation::Update))
            }
        }
    }
}

/// Apply `event` to the cache, then enqueue the items it produced
///
/// Returns the number of items enqueued.
pub fn apply_event<K>(
    mapper: &mut EventMapper,
    writer: &mut Writer<K>,
    queue: &WorkQueue,
    event: &Event<K>,
) -> usize
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    let ready = mapper.map(event, &writer.as_reader());
    writer.apply_watcher_event(event);

    let count = ready.len();
    for queued in ready {
        debug!(identity = %queued.identity, operation = %queued.operation, "watch.event.enqueued");
        observability::metrics::increment_events_enqueued(queue.name(), queued.operation.as_str());
        queue.add(queued);
    }
    count
}

/// Run the watch loop for one kind until `shutdown` turns true
///
/// Watch errors are logged and the watcher retries with its default backoff.
pub async fn run_watch_loop<K>(
    api: Api<K>,
    mut writer: Writer<K>,
    queue: WorkQueue,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    let kind = queue.name().to_string();
    let watch_span = tracing::span!(tracing::Level::INFO, "controller.watch", kind = %kind);

    async move {
        info!("Starting watch loop");
        let cache = writer.as_reader();
        let mut mapper = EventMapper::new();
        let mut stream =
            std::pin::pin!(watcher::watcher(api, watcher::Config::default()).default_backoff());

        loop {
            tokio::select! {
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        apply_event(&mut mapper, &mut writer, &queue, &event);
                        if matches!(event, Event::InitDone) {
                            info!(cached = cache.state().len(), "Initial list loaded");
                        }
                    }
                    Some(Err(e)) => log_watch_error(&kind, &format!("{e:?}")),
                    None => {
                        error!("Watch stream ended");
                        break;
                    }
                },
                () = wait_for_shutdown(&mut shutdown) => {
                    info!("Shutdown requested, exiting watch loop");
                    break;
                }
            }
        }
    }
    .instrument(watch_span)
    .await;

    Ok(())
}

/// Classify a watch error for logging
///
/// The watcher itself backs off and restarts, so this only decides severity.
pub fn log_watch_error(kind: &str, error_string: &str) {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    let is_401 =
        (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found;
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");

    if is_401 {
        error!(
            kind,
            error = error_string,
            "Watch authentication failed (401 Unauthorized), check the controller's RBAC"
        );
    } else if is_410 {
        warn!(kind, error_type = "410", "Watch resource version expired, re-listing");
    } else if is_not_found {
        error!(
            kind,
            error = error_string,
            "Watched resource type not found (404), is the CRD installed?"
        );
    } else {
        warn!(kind, error = error_string, "Watch stream error, retrying with backoff");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backoff::ItemBackoff;
    use crate::controller::handlers::{NodeTranslator, SyncHandler};
    use crate::controller::reconciler::{ControllerSettings, ReconcileController};
    use crate::store::{KvBackend, MemoryBackend, StoreClient};
    use k8s_openapi::api::core::v1::{Node, NodeSpec};
    use kube::api::ObjectMeta;
    use kube_runtime::reflector;
    use std::sync::Arc;
    use std::time::Duration;

    fn node(name: &str, version: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                resource_version: Some(version.to_string()),
                ..ObjectMeta::default()
            },
            ..Node::default()
        }
    }

    fn ops(events: &[QueueEvent]) -> Vec<(String, Operation)> {
        events
            .iter()
            .map(|e| (e.identity.to_string(), e.operation))
            .collect()
    }

    #[test]
    fn test_apply_maps_to_add_then_update() {
        let (cache, mut writer) = reflector::store::<Node>();
        let mut mapper = EventMapper::new();

        let first = Event::Apply(node("n1", "1"));
        assert_eq!(
            ops(&mapper.map(&first, &cache)),
            vec![("n1".to_string(), Operation::Add)]
        );
        writer.apply_watcher_event(&first);

        let resync = Event::Apply(node("n1", "1"));
        assert!(mapper.map(&resync, &cache).is_empty());

        let changed = Event::Apply(node("n1", "2"));
        assert_eq!(
            ops(&mapper.map(&changed, &cache)),
            vec![("n1".to_string(), Operation::Update)]
        );
    }

    #[test]
    fn test_delete_maps_to_delete() {
        let (cache, _writer) = reflector::store::<Node>();
        let mut mapper = EventMapper::new();
        assert_eq!(
            ops(&mapper.map(&Event::Delete(node("n1", "3")), &cache)),
            vec![("n1".to_string(), Operation::Delete)]
        );
    }

    #[test]
    fn test_relist_deletes_objects_missing_from_new_list() {
        let (cache, mut writer) = reflector::store::<Node>();
        let mut mapper = EventMapper::new();
        for event in [
            Event::Init,
            Event::InitApply(node("n1", "1")),
            Event::InitApply(node("n2", "1")),
            Event::InitDone,
        ] {
            mapper.map(&event, &cache);
            writer.apply_watcher_event(&event);
        }

        let mut relist = Vec::new();
        for event in [
            Event::Init,
            Event::InitApply(node("n1", "1")),
            Event::InitApply(node("n3", "1")),
            Event::InitDone,
        ] {
            relist.extend(mapper.map(&event, &cache));
            writer.apply_watcher_event(&event);
        }

        assert_eq!(
            ops(&relist),
            vec![
                ("n3".to_string(), Operation::Add),
                ("n2".to_string(), Operation::Delete),
            ]
        );
    }

    fn node_with_cidr(name: &str, version: &str, pod_cidr: &str) -> Node {
        Node {
            spec: Some(NodeSpec {
                pod_cidr: Some(pod_cidr.to_string()),
                ..NodeSpec::default()
            }),
            ..node(name, version)
        }
    }

    fn node_controller(
        cache: Store<Node>,
        backend: Arc<MemoryBackend>,
    ) -> ReconcileController<NodeTranslator> {
        let queue = WorkQueue::new(
            "node",
            ItemBackoff::new(Duration::from_millis(5), Duration::from_secs(1)),
        );
        ReconcileController::new(
            SyncHandler::new(NodeTranslator, StoreClient::new(backend)),
            Arc::new(cache),
            queue,
            ControllerSettings::default(),
        )
    }

    async fn stored_cidr(backend: &MemoryBackend, path: &str) -> Option<String> {
        let stored = backend.get(path).await.unwrap()?;
        let value: serde_json::Value = serde_json::from_slice(&stored.value).unwrap();
        value["podCIDR"].as_str().map(str::to_string)
    }

    #[tokio::test]
    async fn test_enqueued_add_finds_object_in_cache() {
        let (cache, mut writer) = reflector::store::<Node>();
        let backend = Arc::new(MemoryBackend::new());
        let controller = node_controller(cache.clone(), Arc::clone(&backend));
        let mut mapper = EventMapper::new();

        let event = Event::Apply(node_with_cidr("n1", "1", "10.244.1.0/24"));
        let enqueued = apply_event(&mut mapper, &mut writer, controller.queue(), &event);
        assert_eq!(enqueued, 1);

        // A worker picking the item up right away must see the object.
        assert!(controller.process_next_item().await);
        assert_eq!(
            stored_cidr(&backend, "/nimbess/host/n1").await.as_deref(),
            Some("10.244.1.0/24")
        );
        assert!(controller.queue().is_empty());
    }

    #[tokio::test]
    async fn test_relist_items_wait_for_init_done() {
        let (cache, mut writer) = reflector::store::<Node>();
        let backend = Arc::new(MemoryBackend::new());
        let controller = node_controller(cache.clone(), Arc::clone(&backend));
        let queue = controller.queue();
        let mut mapper = EventMapper::new();

        for event in [
            Event::Init,
            Event::InitApply(node_with_cidr("n1", "1", "10.244.1.0/24")),
            Event::InitDone,
        ] {
            apply_event(&mut mapper, &mut writer, queue, &event);
        }
        assert!(controller.process_next_item().await);

        // Re-list after an expired watch: n1 changed and n2 is new.
        for event in [
            Event::Init,
            Event::InitApply(node_with_cidr("n1", "2", "10.244.9.0/24")),
            Event::InitApply(node_with_cidr("n2", "1", "10.244.2.0/24")),
        ] {
            assert_eq!(apply_event(&mut mapper, &mut writer, queue, &event), 0);
        }
        assert!(queue.is_empty());

        assert_eq!(apply_event(&mut mapper, &mut writer, queue, &Event::InitDone), 2);
        assert_eq!(cache.state().len(), 2);
        assert!(controller.process_next_item().await);
        assert!(controller.process_next_item().await);

        assert_eq!(
            stored_cidr(&backend, "/nimbess/host/n1").await.as_deref(),
            Some("10.244.9.0/24")
        );
        assert_eq!(
            stored_cidr(&backend, "/nimbess/host/n2").await.as_deref(),
            Some("10.244.2.0/24")
        );
    }
}
