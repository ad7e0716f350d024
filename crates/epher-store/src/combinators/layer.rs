use crate::error::{StoreError, StoreResult};
use crate::store::Store;
use crate::types::{BlobInfo, Node};
use async_trait::async_trait;
use epher_hash::Sum;
use std::sync::Arc;

/// Cascades through an ordered list of stores. A get tries each layer in
/// turn, suppressing an earlier layer's error if a later one succeeds and
/// surfacing only the last error if every layer fails; a put stops at the
/// first layer that accepts it.
pub struct Layer {
    layers: Vec<Arc<dyn Store>>,
}

impl Layer {
    pub fn new(layers: Vec<Arc<dyn Store>>) -> Self {
        assert!(!layers.is_empty(), "Layer requires at least one store");
        Self { layers }
    }
}

/// No layer returned `Ok` — every attempt fails closed with the last error
/// seen, since there is no earlier-layer error to suppress in this case.
fn last_err_or_unreachable(last_err: Option<StoreError>) -> StoreError {
    last_err.unwrap_or_else(|| StoreError::Internal(anyhow::anyhow!("Layer has no stores")))
}

#[async_trait]
impl Store for Layer {
    async fn put_node(&self, node: Node) -> StoreResult<()> {
        let mut last_err = None;
        for layer in &self.layers {
            match layer.put_node(node.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err_or_unreachable(last_err))
    }

    async fn get_node(&self, sum: &Sum) -> StoreResult<Option<Node>> {
        let mut last_err = None;
        for layer in &self.layers {
            match layer.get_node(sum).await {
                Ok(Some(node)) => return Ok(Some(node)),
                Ok(None) => continue,
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn put_blob(&self, sum: Sum, data: Vec<u8>) -> StoreResult<()> {
        let mut last_err = None;
        for layer in &self.layers {
            match layer.put_blob(sum.clone(), data.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err_or_unreachable(last_err))
    }

    async fn get_blob(&self, sum: &Sum) -> StoreResult<Option<Vec<u8>>> {
        let mut last_err = None;
        for layer in &self.layers {
            match layer.get_blob(sum).await {
                Ok(Some(data)) => return Ok(Some(data)),
                Ok(None) => continue,
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn info_blob(&self, sum: &Sum) -> StoreResult<Option<BlobInfo>> {
        let mut last_err = None;
        for layer in &self.layers {
            match layer.info_blob(sum).await {
                Ok(Some(info)) => return Ok(Some(info)),
                Ok(None) => continue,
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use epher_hash::{sum, HashType};

    struct AlwaysErrors;

    #[async_trait]
    impl Store for AlwaysErrors {
        async fn put_node(&self, _node: Node) -> StoreResult<()> {
            Err(StoreError::Transient(anyhow::anyhow!("down")))
        }
        async fn get_node(&self, _sum: &Sum) -> StoreResult<Option<Node>> {
            Err(StoreError::Transient(anyhow::anyhow!("down")))
        }
        async fn put_blob(&self, _sum: Sum, _data: Vec<u8>) -> StoreResult<()> {
            Err(StoreError::Transient(anyhow::anyhow!("down")))
        }
        async fn get_blob(&self, _sum: &Sum) -> StoreResult<Option<Vec<u8>>> {
            Err(StoreError::Transient(anyhow::anyhow!("down")))
        }
        async fn info_blob(&self, _sum: &Sum) -> StoreResult<Option<BlobInfo>> {
            Err(StoreError::Transient(anyhow::anyhow!("down")))
        }
    }

    #[tokio::test]
    async fn get_cascades_to_a_later_layer_on_miss() {
        let front = Arc::new(MemoryStore::named("front"));
        let back = Arc::new(MemoryStore::named("back"));
        let s = sum(HashType::Sha1, b"data");
        back.put_blob(s.clone(), b"data".to_vec()).await.unwrap();

        let layer = Layer::new(vec![front.clone(), back.clone()]);
        let got = layer.get_blob(&s).await.unwrap();
        assert_eq!(got, Some(b"data".to_vec()));
        // No backfill: the front layer still doesn't have it.
        assert_eq!(front.get_blob(&s).await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_suppresses_an_earlier_layers_error_when_a_later_one_hits() {
        let back = Arc::new(MemoryStore::named("back"));
        let s = sum(HashType::Sha1, b"data");
        back.put_blob(s.clone(), b"data".to_vec()).await.unwrap();

        let layer = Layer::new(vec![Arc::new(AlwaysErrors), back]);
        assert_eq!(layer.get_blob(&s).await.unwrap(), Some(b"data".to_vec()));
    }

    #[tokio::test]
    async fn get_returns_the_last_error_when_every_layer_fails() {
        let layer = Layer::new(vec![Arc::new(AlwaysErrors), Arc::new(AlwaysErrors)]);
        let s = sum(HashType::Sha1, b"x");
        assert!(layer.get_blob(&s).await.is_err());
    }

    #[tokio::test]
    async fn put_stops_at_the_first_layer_that_accepts_it() {
        let a = Arc::new(MemoryStore::named("a"));
        let b = Arc::new(MemoryStore::named("b"));
        let layer = Layer::new(vec![a.clone(), b.clone()]);
        let s = sum(HashType::Sha1, b"x");
        layer.put_blob(s.clone(), b"x".to_vec()).await.unwrap();
        assert_eq!(a.get_blob(&s).await.unwrap(), Some(b"x".to_vec()));
        // b never gets the write: a already succeeded.
        assert_eq!(b.get_blob(&s).await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_falls_through_to_a_later_layer_when_an_earlier_one_fails() {
        let b = Arc::new(MemoryStore::named("b"));
        let layer = Layer::new(vec![Arc::new(AlwaysErrors), b.clone()]);
        let s = sum(HashType::Sha1, b"y");
        layer.put_blob(s.clone(), b"y".to_vec()).await.unwrap();
        assert_eq!(b.get_blob(&s).await.unwrap(), Some(b"y".to_vec()));
    }

    #[tokio::test]
    async fn miss_on_all_layers_returns_none() {
        let a = Arc::new(MemoryStore::named("a"));
        let layer = Layer::new(vec![a]);
        let s = sum(HashType::Sha1, b"nope");
        assert_eq!(layer.get_blob(&s).await.unwrap(), None);
    }
}
