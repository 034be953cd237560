//! # etcd backend
//!
//! [`KvBackend`] over the etcd v3 API. Each [`Txn`] maps onto one etcd
//! transaction, so the compare and the write happen in a single round trip
//! against the latest committed revision.

use super::{Compare, CompareOp, KvBackend, StoreError, StoredValue, Txn, TxnOp, TxnOutcome};
use async_trait::async_trait;
use etcd_client::{
    Client, Compare as EtcdCompare, CompareOp as EtcdCompareOp, ConnectOptions, PutOptions,
    Txn as EtcdTxn, TxnOp as EtcdTxnOp, TxnOpResponse,
};
use std::time::Duration;
use tracing::info;

/// etcd v3 datastore backend
///
/// The underlying gRPC channel is safe for concurrent use, so one backend is
/// shared by every worker without client-side locking.
#[derive(Clone)]
pub struct EtcdBackend {
    client: Client,
}

impl std::fmt::Debug for EtcdBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdBackend").finish_non_exhaustive()
    }
}

impl EtcdBackend {
    /// Connect to the given endpoints
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] when no endpoint is given or the
    /// connection cannot be established within `dial_timeout`.
    pub async fn connect(endpoints: &[String], dial_timeout: Duration) -> Result<Self, StoreError> {
        if endpoints.is_empty() {
            return Err(StoreError::Transport(
                "no etcd endpoints specified".to_string(),
            ));
        }

        info!(endpoints = ?endpoints, "Connecting to etcd...");
        let options = ConnectOptions::new().with_connect_timeout(dial_timeout);
        let client = Client::connect(endpoints, Some(options))
            .await
            .map_err(|e| StoreError::Transport(format!("failed to connect to etcd: {e}")))?;

        Ok(Self { client })
    }

    async fn to_etcd_ops(&self, ops: Vec<TxnOp>) -> Result<Vec<EtcdTxnOp>, StoreError> {
        let mut out = Vec::with_capacity(ops.len());
        for op in ops {
            let op = match op {
                TxnOp::Put { path, value, ttl } => {
                    let options = match ttl {
                        Some(ttl) => Some(PutOptions::new().with_lease(self.grant_lease(ttl).await?)),
                        None => None,
                    };
                    EtcdTxnOp::put(path, value, options)
                }
                TxnOp::Delete { path } => EtcdTxnOp::delete(path, None),
                TxnOp::Get { path } => EtcdTxnOp::get(path, None),
            };
            out.push(op);
        }
        Ok(out)
    }

    // The lease is granted ahead of the transaction. If the transaction does
    // not take the put branch the lease is left unused and expires by itself.
    async fn grant_lease(&self, ttl: Duration) -> Result<i64, StoreError> {
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1);
        let mut leases = self.client.lease_client();
        let lease = leases.grant(seconds, None).await.map_err(transport)?;
        Ok(lease.id())
    }
}

fn to_etcd_compare(compare: Compare) -> EtcdCompare {
    let op = match compare.op {
        CompareOp::Equal => EtcdCompareOp::Equal,
        CompareOp::NotEqual => EtcdCompareOp::NotEqual,
    };
    EtcdCompare::mod_revision(compare.path, op, compare.revision)
}

fn transport(err: etcd_client::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

#[async_trait]
impl KvBackend for EtcdBackend {
    async fn txn(&self, txn: Txn) -> Result<TxnOutcome, StoreError> {
        let success = self.to_etcd_ops(txn.success).await?;
        let failure = self.to_etcd_ops(txn.failure).await?;
        let etcd_txn = EtcdTxn::new()
            .when(vec![to_etcd_compare(txn.compare)])
            .and_then(success)
            .or_else(failure);

        let mut kv = self.client.kv_client();
        let resp = kv.txn(etcd_txn).await.map_err(transport)?;

        let reads = resp
            .op_responses()
            .into_iter()
            .filter_map(|op| match op {
                TxnOpResponse::Get(get) => Some(get),
                _ => None,
            })
            .flat_map(|get| {
                get.kvs()
                    .iter()
                    .map(|kv| StoredValue {
                        value: kv.value().to_vec(),
                        mod_revision: kv.mod_revision(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(TxnOutcome {
            succeeded: resp.succeeded(),
            revision: resp.header().map_or(0, |h| h.revision()),
            reads,
        })
    }

    async fn get(&self, path: &str) -> Result<Option<StoredValue>, StoreError> {
        let mut kv = self.client.kv_client();
        let resp = kv.get(path, None).await.map_err(transport)?;
        Ok(resp.kvs().first().map(|kv| StoredValue {
            value: kv.value().to_vec(),
            mod_revision: kv.mod_revision(),
        }))
    }
}
