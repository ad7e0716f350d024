use crate::error::StoreResult;
use crate::store::Store;
use crate::types::{BlobInfo, Node};
use async_trait::async_trait;
use epher_hash::Sum;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Chooses which of several equivalent backends handles the next call.
pub trait Picker: Send + Sync {
    fn pick(&self, len: usize) -> usize;
}

/// Picks a uniformly random backend on every call.
pub struct Random;

impl Picker for Random {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Cycles through backends starting from a random offset, so two freshly
/// created load balancers don't all hammer index 0 first.
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            next: AtomicUsize::new(rand::thread_rng().gen_range(0..usize::MAX / 2)),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl Picker for RoundRobin {
    fn pick(&self, len: usize) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % len
    }
}

/// Picks one of `n` equivalent stores per call and retries the next pick on
/// failure. There is no retry cap — a persistently failing cluster retries
/// forever; callers enforce a deadline via their own timeout, not this
/// combinator.
pub struct LoadBalance {
    stores: Vec<Arc<dyn Store>>,
    picker: Box<dyn Picker>,
}

impl LoadBalance {
    pub fn new(stores: Vec<Arc<dyn Store>>, picker: Box<dyn Picker>) -> Self {
        assert!(!stores.is_empty(), "LoadBalance requires at least one store");
        Self { stores, picker }
    }

    async fn with_retry<T, F, Fut>(&self, f: F) -> StoreResult<T>
    where
        F: Fn(&Arc<dyn Store>) -> Fut,
        Fut: std::future::Future<Output = StoreResult<T>>,
    {
        loop {
            let idx = self.picker.pick(self.stores.len());
            match f(&self.stores[idx]).await {
                Ok(value) => return Ok(value),
                Err(_) => continue,
            }
        }
    }
}

#[async_trait]
impl Store for LoadBalance {
    async fn put_node(&self, node: Node) -> StoreResult<()> {
        self.with_retry(|s| s.put_node(node.clone())).await
    }

    async fn get_node(&self, sum: &Sum) -> StoreResult<Option<Node>> {
        self.with_retry(|s| s.get_node(sum)).await
    }

    async fn put_blob(&self, sum: Sum, data: Vec<u8>) -> StoreResult<()> {
        self.with_retry(|s| s.put_blob(sum.clone(), data.clone())).await
    }

    async fn get_blob(&self, sum: &Sum) -> StoreResult<Option<Vec<u8>>> {
        self.with_retry(|s| s.get_blob(sum)).await
    }

    async fn info_blob(&self, sum: &Sum) -> StoreResult<Option<BlobInfo>> {
        self.with_retry(|s| s.info_blob(sum)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use epher_hash::{sum, HashType};

    #[tokio::test]
    async fn round_robin_visits_every_store() {
        let a = Arc::new(MemoryStore::named("a"));
        let b = Arc::new(MemoryStore::named("b"));
        let lb = LoadBalance::new(vec![a.clone(), b.clone()], Box::new(RoundRobin::new()));

        for i in 0..4 {
            let s = sum(HashType::Sha1, format!("k{i}").as_bytes());
            lb.put_blob(s, vec![i as u8]).await.unwrap();
        }
        assert_eq!(a.len_blobs() + b.len_blobs(), 4);
    }

    #[tokio::test]
    async fn random_picker_reads_from_either_replica() {
        // Replicas hold identical data, as load balancing assumes — a
        // legitimate miss on one (Ok(None)) is not an error to retry past.
        let a = Arc::new(MemoryStore::named("a"));
        let b = Arc::new(MemoryStore::named("b"));
        let s = sum(HashType::Sha1, b"replicated");
        a.put_blob(s.clone(), b"v".to_vec()).await.unwrap();
        b.put_blob(s.clone(), b"v".to_vec()).await.unwrap();

        let lb = LoadBalance::new(vec![a, b], Box::new(Random));
        assert_eq!(lb.get_blob(&s).await.unwrap(), Some(b"v".to_vec()));
    }
}
