//! # In-memory backend
//!
//! A [`KvBackend`] kept entirely in process. It follows the etcd revision
//! model: a single store revision incremented by every write, and a mod
//! revision per key. Used by tests and by `--store memory` dry runs.

use super::{KvBackend, StoreError, StoredValue, Txn, TxnOp, TxnOutcome};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    mod_revision: i64,
    ttl: Option<Duration>,
}

#[derive(Debug, Default)]
struct MemoryState {
    revision: i64,
    entries: BTreeMap<String, Entry>,
}

/// In-process transactional key-value store
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// TTL recorded for a key at its last write
    ///
    /// Keys are never expired by this backend.
    pub fn ttl(&self, path: &str) -> Option<Duration> {
        self.lock()
            .ok()
            .and_then(|s| s.entries.get(path).and_then(|e| e.ttl))
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Transport(format!("memory backend lock poisoned: {e}")))
    }
}

impl MemoryState {
    fn mod_revision(&self, path: &str) -> i64 {
        self.entries.get(path).map_or(0, |e| e.mod_revision)
    }

    fn apply(&mut self, op: TxnOp, reads: &mut Vec<StoredValue>) {
        match op {
            TxnOp::Put { path, value, ttl } => {
                self.revision += 1;
                self.entries.insert(
                    path,
                    Entry {
                        value,
                        mod_revision: self.revision,
                        ttl,
                    },
                );
            }
            TxnOp::Delete { path } => {
                if self.entries.remove(&path).is_some() {
                    self.revision += 1;
                }
            }
            TxnOp::Get { path } => {
                if let Some(entry) = self.entries.get(&path) {
                    reads.push(StoredValue {
                        value: entry.value.clone(),
                        mod_revision: entry.mod_revision,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn txn(&self, txn: Txn) -> Result<TxnOutcome, StoreError> {
        let mut state = self.lock()?;
        let succeeded = txn.compare.holds(state.mod_revision(&txn.compare.path));
        let ops = if succeeded { txn.success } else { txn.failure };

        let mut reads = Vec::new();
        for op in ops {
            state.apply(op, &mut reads);
        }

        Ok(TxnOutcome {
            succeeded,
            revision: state.revision,
            reads,
        })
    }

    async fn get(&self, path: &str) -> Result<Option<StoredValue>, StoreError> {
        let state = self.lock()?;
        Ok(state.entries.get(path).map(|e| StoredValue {
            value: e.value.clone(),
            mod_revision: e.mod_revision,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Compare;

    fn put(path: &str, value: &[u8]) -> TxnOp {
        TxnOp::Put {
            path: path.to_string(),
            value: value.to_vec(),
            ttl: None,
        }
    }

    #[tokio::test]
    async fn test_put_if_absent_only_once() {
        let backend = MemoryBackend::new();

        let first = backend
            .txn(Txn::when(Compare::not_found("/a")).and_then(put("/a", b"1")))
            .await
            .unwrap();
        assert!(first.succeeded);
        assert_eq!(first.revision, 1);

        let second = backend
            .txn(
                Txn::when(Compare::not_found("/a"))
                    .and_then(put("/a", b"2"))
                    .or_else(TxnOp::Get {
                        path: "/a".to_string(),
                    }),
            )
            .await
            .unwrap();
        assert!(!second.succeeded);
        assert_eq!(second.reads[0].value, b"1");
        assert_eq!(second.revision, 1);
    }

    #[tokio::test]
    async fn test_mod_revision_tracks_last_write() {
        let backend = MemoryBackend::new();
        backend
            .txn(Txn::when(Compare::not_found("/a")).and_then(put("/a", b"1")))
            .await
            .unwrap();
        backend
            .txn(Txn::when(Compare::not_found("/b")).and_then(put("/b", b"1")))
            .await
            .unwrap();
        backend
            .txn(Txn::when(Compare::at_revision("/a", 1)).and_then(put("/a", b"2")))
            .await
            .unwrap();

        let a = backend.get("/a").await.unwrap().unwrap();
        assert_eq!(a.value, b"2");
        assert_eq!(a.mod_revision, 3);
        assert_eq!(backend.get("/b").await.unwrap().unwrap().mod_revision, 2);
    }

    #[tokio::test]
    async fn test_delete_missing_key_does_not_bump_revision() {
        let backend = MemoryBackend::new();
        let outcome = backend
            .txn(Txn::when(Compare::found("/a")).and_then(TxnOp::Delete {
                path: "/a".to_string(),
            }))
            .await
            .unwrap();
        assert!(!outcome.succeeded);
        assert_eq!(outcome.revision, 0);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_ttl_is_recorded() {
        let backend = MemoryBackend::new();
        backend
            .txn(Txn::when(Compare::not_found("/a")).and_then(TxnOp::Put {
                path: "/a".to_string(),
                value: b"1".to_vec(),
                ttl: Some(Duration::from_secs(10)),
            }))
            .await
            .unwrap();
        assert_eq!(backend.ttl("/a"), Some(Duration::from_secs(10)));
        assert_eq!(backend.len(), 1);
    }
}
