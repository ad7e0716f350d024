use crate::error::StoreResult;
use crate::store::Store;
use crate::types::{BlobInfo, Node};
use async_trait::async_trait;
use epher_hash::Sum;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Wraps a store so every call is logged on entry, success, and failure with
/// its elapsed time, the way the original store package's interceptor
/// logged each operation for operators tailing a log rather than a tracer.
pub struct Log {
    inner: Arc<dyn Store>,
    name: String,
}

impl Log {
    pub fn new(inner: Arc<dyn Store>, name: impl Into<String>) -> Self {
        Self {
            inner,
            name: name.into(),
        }
    }

    async fn traced<T, F, Fut>(&self, op: &'static str, f: F) -> StoreResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = StoreResult<T>>,
    {
        let start = Instant::now();
        info!(store = %self.name, op, "store call starting");
        match f().await {
            Ok(value) => {
                info!(store = %self.name, op, elapsed_ms = start.elapsed().as_millis() as u64, "store call done");
                Ok(value)
            }
            Err(e) => {
                warn!(store = %self.name, op, elapsed_ms = start.elapsed().as_millis() as u64, error = %e, "store call failed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Store for Log {
    async fn put_node(&self, node: Node) -> StoreResult<()> {
        self.traced("put_node", || self.inner.put_node(node)).await
    }

    async fn get_node(&self, sum: &Sum) -> StoreResult<Option<Node>> {
        self.traced("get_node", || self.inner.get_node(sum)).await
    }

    async fn put_blob(&self, sum: Sum, data: Vec<u8>) -> StoreResult<()> {
        self.traced("put_blob", || self.inner.put_blob(sum, data)).await
    }

    async fn get_blob(&self, sum: &Sum) -> StoreResult<Option<Vec<u8>>> {
        self.traced("get_blob", || self.inner.get_blob(sum)).await
    }

    async fn info_blob(&self, sum: &Sum) -> StoreResult<Option<BlobInfo>> {
        self.traced("info_blob", || self.inner.info_blob(sum)).await
    }
}
