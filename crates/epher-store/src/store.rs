use crate::error::StoreResult;
use crate::types::{BlobInfo, Node};
use async_trait::async_trait;
use epher_hash::Sum;

/// The storage contract every backend and every combinator implements.
///
/// Implementations must be idempotent: putting the same `sum` twice is a
/// no-op, not an error. Getters return `Ok(None)` for an absent object —
/// there is no dedicated not-found error.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put_node(&self, node: Node) -> StoreResult<()>;

    async fn get_node(&self, sum: &Sum) -> StoreResult<Option<Node>>;

    async fn put_blob(&self, sum: Sum, data: Vec<u8>) -> StoreResult<()>;

    async fn get_blob(&self, sum: &Sum) -> StoreResult<Option<Vec<u8>>>;

    async fn info_blob(&self, sum: &Sum) -> StoreResult<Option<BlobInfo>>;
}

/// Blanket impl so `Arc<dyn Store>` and other owned pointers to a `Store`
/// can themselves be used wherever a `Store` is expected.
#[async_trait]
impl<T: Store + ?Sized> Store for std::sync::Arc<T> {
    async fn put_node(&self, node: Node) -> StoreResult<()> {
        (**self).put_node(node).await
    }

    async fn get_node(&self, sum: &Sum) -> StoreResult<Option<Node>> {
        (**self).get_node(sum).await
    }

    async fn put_blob(&self, sum: Sum, data: Vec<u8>) -> StoreResult<()> {
        (**self).put_blob(sum, data).await
    }

    async fn get_blob(&self, sum: &Sum) -> StoreResult<Option<Vec<u8>>> {
        (**self).get_blob(sum).await
    }

    async fn info_blob(&self, sum: &Sum) -> StoreResult<Option<BlobInfo>> {
        (**self).info_blob(sum).await
    }
}
