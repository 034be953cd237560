//! Common fixtures for controller integration tests
//!
//! Provides an in-memory watch cache, datastore backends that record or fail
//! every transaction, and helpers to run a controller until a condition holds.

#![allow(dead_code, reason = "each test binary uses a subset of the fixtures")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeSpec, NodeStatus};
use kube::api::ObjectMeta;
use stargazer::controller::cache::{CacheError, ResourceCache};
use stargazer::controller::identity::ResourceIdentity;
use stargazer::store::{
    KvBackend, MemoryBackend, StoreError, StoredValue, Txn, TxnOp, TxnOutcome,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Cluster node with a hostname address and a pod CIDR
pub fn node(name: &str, pod_cidr: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            uid: Some(format!("uid-{name}")),
            resource_version: Some("1".to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(NodeSpec {
            pod_cidr: Some(pod_cidr.to_string()),
            ..NodeSpec::default()
        }),
        status: Some(NodeStatus {
            addresses: Some(vec![
                NodeAddress {
                    type_: "Hostname".to_string(),
                    address: name.to_string(),
                },
                NodeAddress {
                    type_: "InternalIP".to_string(),
                    address: "192.168.1.10".to_string(),
                },
            ]),
            ..NodeStatus::default()
        }),
    }
}

/// Watch cache backed by a map, synced on demand
pub struct MapCache<K> {
    objects: Mutex<HashMap<ResourceIdentity, Arc<K>>>,
    synced: watch::Sender<bool>,
}

impl<K: kube::Resource> MapCache<K> {
    pub fn new() -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            objects: Mutex::new(HashMap::new()),
            synced,
        }
    }

    /// Cache that reports synced from the start
    pub fn synced() -> Self {
        let cache = Self::new();
        cache.mark_synced();
        cache
    }

    pub fn mark_synced(&self) {
        self.synced.send_replace(true);
    }

    pub fn insert(&self, obj: K) -> ResourceIdentity {
        let identity = ResourceIdentity::from_resource(&obj).expect("test object has a name");
        self.objects
            .lock()
            .unwrap()
            .insert(identity.clone(), Arc::new(obj));
        identity
    }

    pub fn remove(&self, identity: &ResourceIdentity) {
        self.objects.lock().unwrap().remove(identity);
    }
}

#[async_trait]
impl<K: Send + Sync + 'static> ResourceCache<K> for MapCache<K> {
    fn get(&self, identity: &ResourceIdentity) -> Option<Arc<K>> {
        self.objects.lock().unwrap().get(identity).cloned()
    }

    async fn wait_synced(&self) -> Result<(), CacheError> {
        let mut rx = self.synced.subscribe();
        let synced = rx.wait_for(|synced| *synced).await.is_ok();
        if synced {
            Ok(())
        } else {
            Err(CacheError::WriterDropped)
        }
    }
}

/// A committed transaction and whether its comparison held
#[derive(Debug, Clone)]
pub struct Recorded {
    pub txn: Txn,
    pub succeeded: bool,
}

/// Memory backend that records every transaction
///
/// An optional delay is applied inside each transaction, and the number of
/// transactions in flight per path is tracked.
#[derive(Default)]
pub struct RecordingBackend {
    inner: MemoryBackend,
    recorded: Mutex<Vec<Recorded>>,
    delay: Duration,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight_per_path: AtomicUsize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }

    /// Paths written by successful puts, in commit order
    pub fn puts(&self) -> Vec<String> {
        self.applied(|op| match op {
            TxnOp::Put { path, .. } => Some(path.clone()),
            _ => None,
        })
    }

    /// Paths removed by successful deletes, in commit order
    pub fn deletes(&self) -> Vec<String> {
        self.applied(|op| match op {
            TxnOp::Delete { path } => Some(path.clone()),
            _ => None,
        })
    }

    pub fn max_in_flight_per_path(&self) -> usize {
        self.max_in_flight_per_path.load(Ordering::SeqCst)
    }

    pub async fn value(&self, path: &str) -> Option<serde_json::Value> {
        let stored = self.inner.get(path).await.unwrap()?;
        Some(serde_json::from_slice(&stored.value).unwrap())
    }

    fn applied(&self, select: impl Fn(&TxnOp) -> Option<String>) -> Vec<String> {
        self.recorded()
            .iter()
            .filter(|r| r.succeeded)
            .flat_map(|r| r.txn.success.iter().filter_map(&select).collect::<Vec<_>>())
            .collect()
    }

    fn enter(&self, path: &str) {
        let mut in_flight = self.in_flight.lock().unwrap();
        let count = in_flight.entry(path.to_string()).or_default();
        *count += 1;
        self.max_in_flight_per_path
            .fetch_max(*count, Ordering::SeqCst);
    }

    fn exit(&self, path: &str) {
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(count) = in_flight.get_mut(path) {
            *count -= 1;
        }
    }
}

#[async_trait]
impl KvBackend for RecordingBackend {
    async fn txn(&self, txn: Txn) -> Result<TxnOutcome, StoreError> {
        let path = txn.compare.path.clone();
        self.enter(&path);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let outcome = self.inner.txn(txn.clone()).await;
        self.exit(&path);

        if let Ok(o) = &outcome {
            self.recorded.lock().unwrap().push(Recorded {
                txn,
                succeeded: o.succeeded,
            });
        }
        outcome
    }

    async fn get(&self, path: &str) -> Result<Option<StoredValue>, StoreError> {
        self.inner.get(path).await
    }
}

/// Backend whose every call fails with a transport error
#[derive(Default)]
pub struct FailingBackend {
    attempts: AtomicUsize,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvBackend for FailingBackend {
    async fn txn(&self, _txn: Txn) -> Result<TxnOutcome, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Transport("connection refused".to_string()))
    }

    async fn get(&self, _path: &str) -> Result<Option<StoredValue>, StoreError> {
        Err(StoreError::Transport("connection refused".to_string()))
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
