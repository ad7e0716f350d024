use crate::error::StoreResult;
use crate::metrics::metrics;
use crate::store::Store;
use crate::types::{BlobInfo, Node};
use async_trait::async_trait;
use epher_hash::Sum;
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-process `Store` backed by two `RwLock`-guarded maps. Used as the
/// local leaf of a cluster's combinator stack and throughout the test suite.
pub struct MemoryStore {
    nodes: RwLock<HashMap<Sum, Node>>,
    blobs: RwLock<HashMap<Sum, Vec<u8>>>,
    name: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            blobs: RwLock::new(HashMap::new()),
            name: name.into(),
        }
    }

    pub fn len_nodes(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn len_blobs(&self) -> usize {
        self.blobs.read().len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_node(&self, node: Node) -> StoreResult<()> {
        metrics()
            .calls_total
            .with_label_values(&["put_node", &self.name])
            .inc();
        self.nodes.write().entry(node.sum.clone()).or_insert(node);
        Ok(())
    }

    async fn get_node(&self, sum: &Sum) -> StoreResult<Option<Node>> {
        metrics()
            .calls_total
            .with_label_values(&["get_node", &self.name])
            .inc();
        Ok(self.nodes.read().get(sum).cloned())
    }

    async fn put_blob(&self, sum: Sum, data: Vec<u8>) -> StoreResult<()> {
        metrics()
            .calls_total
            .with_label_values(&["put_blob", &self.name])
            .inc();
        self.blobs.write().entry(sum).or_insert(data);
        Ok(())
    }

    async fn get_blob(&self, sum: &Sum) -> StoreResult<Option<Vec<u8>>> {
        metrics()
            .calls_total
            .with_label_values(&["get_blob", &self.name])
            .inc();
        Ok(self.blobs.read().get(sum).cloned())
    }

    async fn info_blob(&self, sum: &Sum) -> StoreResult<Option<BlobInfo>> {
        metrics()
            .calls_total
            .with_label_values(&["info_blob", &self.name])
            .inc();
        Ok(self.blobs.read().get(sum).map(|data| BlobInfo {
            sum: sum.clone(),
            size: data.len() as i64,
        }))
    }
}
