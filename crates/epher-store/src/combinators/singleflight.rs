use crate::error::{StoreError, StoreResult};
use crate::metrics::metrics;
use crate::store::Store;
use crate::types::{BlobInfo, Node};
use async_trait::async_trait;
use epher_hash::Sum;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Key identifying a single in-flight read: the operation name plus the sum
/// being looked up. Two concurrent `get_blob(sum)` calls share one key;
/// `get_blob(sum)` and `get_node(sum)` do not, even for the same sum.
#[derive(Clone, PartialEq, Eq, Hash)]
struct FlightKey {
    op: &'static str,
    sum: Sum,
}

/// Coalesces concurrent reads for the same key onto a single backend call.
/// The caller that arrives first performs the call and broadcasts the
/// result to every caller that arrived while it was in flight.
struct Coalescer<T> {
    inflight: Mutex<HashMap<FlightKey, broadcast::Sender<Result<Option<T>, String>>>>,
}

impl<T: Clone + Send + 'static> Coalescer<T> {
    fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    async fn run<F, Fut>(&self, op: &'static str, sum: &Sum, f: F) -> StoreResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = StoreResult<Option<T>>>,
    {
        let key = FlightKey {
            op,
            sum: sum.clone(),
        };

        let rx = {
            let mut inflight = self.inflight.lock();
            match inflight.get(&key) {
                Some(tx) => {
                    metrics().singleflight_dedup_total.with_label_values(&[op]).inc();
                    Some(tx.subscribe())
                }
                None => {
                    let (tx, _rx) = broadcast::channel(1);
                    inflight.insert(key.clone(), tx);
                    None
                }
            }
        };

        if let Some(rx) = rx {
            return wait_for_result(rx).await;
        }

        let result = f().await;

        let tx = {
            let mut inflight = self.inflight.lock();
            inflight
                .remove(&key)
                .expect("leader always owns its own in-flight entry")
        };
        let broadcastable = result.as_ref().map(|v| v.clone()).map_err(|e| e.to_string());
        let _ = tx.send(broadcastable);
        result
    }
}

async fn wait_for_result<T: Clone>(
    mut rx: broadcast::Receiver<Result<Option<T>, String>>,
) -> StoreResult<Option<T>> {
    match rx.recv().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(msg)) => Err(StoreError::Transient(anyhow::anyhow!(msg))),
        Err(_) => Err(StoreError::Cancelled),
    }
}

/// Wraps a `Store` so concurrent identical reads and writes share one
/// underlying call. Puts are keyed on `(op, sum)` just like reads — two
/// concurrent puts for the same sum are idempotent (same content-addressed
/// payload by construction), so coalescing them prevents a stampede of
/// identical replication calls without changing what any caller observes.
pub struct SingleFlight {
    inner: Arc<dyn Store>,
    nodes: Coalescer<Node>,
    blobs: Coalescer<Vec<u8>>,
    infos: Coalescer<BlobInfo>,
    node_puts: Coalescer<()>,
    blob_puts: Coalescer<()>,
}

impl SingleFlight {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            nodes: Coalescer::new(),
            blobs: Coalescer::new(),
            infos: Coalescer::new(),
            node_puts: Coalescer::new(),
            blob_puts: Coalescer::new(),
        }
    }
}

#[async_trait]
impl Store for SingleFlight {
    async fn put_node(&self, node: Node) -> StoreResult<()> {
        let inner = self.inner.clone();
        let sum = node.sum.clone();
        self.node_puts
            .run("put_node", &sum, move || async move {
                inner.put_node(node).await.map(|()| Some(()))
            })
            .await
            .map(|_| ())
    }

    async fn get_node(&self, sum: &Sum) -> StoreResult<Option<Node>> {
        let inner = self.inner.clone();
        let sum_owned = sum.clone();
        self.nodes
            .run("get_node", sum, move || async move { inner.get_node(&sum_owned).await })
            .await
    }

    async fn put_blob(&self, sum: Sum, data: Vec<u8>) -> StoreResult<()> {
        let inner = self.inner.clone();
        let sum_for_call = sum.clone();
        self.blob_puts
            .run("put_blob", &sum, move || async move {
                inner.put_blob(sum_for_call, data).await.map(|()| Some(()))
            })
            .await
            .map(|_| ())
    }

    async fn get_blob(&self, sum: &Sum) -> StoreResult<Option<Vec<u8>>> {
        let inner = self.inner.clone();
        let sum_owned = sum.clone();
        self.blobs
            .run("get_blob", sum, move || async move { inner.get_blob(&sum_owned).await })
            .await
    }

    async fn info_blob(&self, sum: &Sum) -> StoreResult<Option<BlobInfo>> {
        let inner = self.inner.clone();
        let sum_owned = sum.clone();
        self.infos
            .run("info_blob", sum, move || async move {
                inner.info_blob(&sum_owned).await
            })
            .await
    }
}
