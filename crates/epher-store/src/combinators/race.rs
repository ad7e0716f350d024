use super::pool::Pool;
use crate::error::{StoreError, StoreResult};
use crate::metrics::metrics;
use crate::store::Store;
use crate::types::{BlobInfo, Node};
use async_trait::async_trait;
use epher_hash::Sum;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;

/// Decides how many of `total` equivalent stores a single race should draw,
/// before the `min` floor is applied.
pub type GrowthFn = fn(total: usize) -> usize;

/// `ceil(log2(total))` — cheap, optimistic for the common case where at
/// least one of a handful of replicas answers.
pub fn growth_log2(total: usize) -> usize {
    (usize::BITS - total.max(1).leading_zeros()) as usize
}

/// `ceil(log2(total))^2` — draws a wider pool per race, trading more
/// concurrent requests for a better odds on a flaky cluster.
pub fn growth_log2_square(total: usize) -> usize {
    let step = growth_log2(total);
    step * step
}

/// Races a get across `max(min, growth(n))` stores sampled uniformly at
/// random (with replacement, capped at `n`), returning the first success. A
/// put races the same sampled subset, succeeding as soon as any one of them
/// accepts the write.
pub struct Race {
    stores: Vec<Arc<dyn Store>>,
    growth: GrowthFn,
    min: usize,
}

impl Race {
    pub fn new(stores: Vec<Arc<dyn Store>>) -> Self {
        Self::with_growth(stores, growth_log2, 3)
    }

    pub fn with_growth(stores: Vec<Arc<dyn Store>>, growth: GrowthFn, min: usize) -> Self {
        assert!(!stores.is_empty(), "Race requires at least one store");
        Self {
            stores,
            growth,
            min,
        }
    }

    /// Draws `max(min, growth(n))` indices uniformly at random with
    /// replacement, deduplicated and capped at `n` distinct stores.
    fn sample(&self) -> Vec<usize> {
        let n = self.stores.len();
        let want = (self.growth)(n).max(self.min).min(n);
        let mut rng = rand::thread_rng();
        let mut picked = HashSet::with_capacity(want);
        while picked.len() < want {
            picked.insert(rng.gen_range(0..n));
        }
        picked.into_iter().collect()
    }

    async fn race_get<T, F>(&self, op: &'static str, call: F) -> StoreResult<Option<T>>
    where
        T: Send + 'static,
        F: for<'a> Fn(&'a Arc<dyn Store>) -> futures::future::BoxFuture<'a, StoreResult<Option<T>>>
            + Send
            + Sync,
    {
        let sample = self.sample();
        let mut in_flight: FuturesUnordered<_> = sample
            .into_iter()
            .map(|idx| {
                let fut = call(&self.stores[idx]);
                async move { (idx, fut.await) }
            })
            .collect();

        let mut last_err = None;
        while let Some((idx, res)) = in_flight.next().await {
            match res {
                Ok(Some(value)) => {
                    metrics()
                        .race_winner_total
                        .with_label_values(&[op, &idx.to_string()])
                        .inc();
                    return Ok(Some(value));
                }
                Ok(None) => continue,
                Err(e) => last_err = Some(e),
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn race_put<F>(&self, call: F) -> StoreResult<()>
    where
        F: for<'a> Fn(&'a Arc<dyn Store>) -> futures::future::BoxFuture<'a, StoreResult<()>>
            + Send
            + Sync,
    {
        let sample = self.sample();
        let mut in_flight: FuturesUnordered<_> =
            sample.into_iter().map(|idx| call(&self.stores[idx])).collect();

        let mut last_err = None;
        while let Some(res) = in_flight.next().await {
            match res {
                Ok(()) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Store for Race {
    async fn put_node(&self, node: Node) -> StoreResult<()> {
        self.race_put(move |s| {
            let node = node.clone();
            Box::pin(async move { s.put_node(node).await })
        })
        .await
    }

    async fn get_node(&self, sum: &Sum) -> StoreResult<Option<Node>> {
        let sum = sum.clone();
        self.race_get("get_node", move |s| {
            let sum = sum.clone();
            Box::pin(async move { s.get_node(&sum).await })
        })
        .await
    }

    async fn put_blob(&self, sum: Sum, data: Vec<u8>) -> StoreResult<()> {
        self.race_put(move |s| {
            let sum = sum.clone();
            let data = data.clone();
            Box::pin(async move { s.put_blob(sum, data).await })
        })
        .await
    }

    async fn get_blob(&self, sum: &Sum) -> StoreResult<Option<Vec<u8>>> {
        let sum = sum.clone();
        self.race_get("get_blob", move |s| {
            let sum = sum.clone();
            Box::pin(async move { s.get_blob(&sum).await })
        })
        .await
    }

    async fn info_blob(&self, sum: &Sum) -> StoreResult<Option<BlobInfo>> {
        let sum = sum.clone();
        self.race_get("info_blob", move |s| {
            let sum = sum.clone();
            Box::pin(async move { s.info_blob(&sum).await })
        })
        .await
    }
}

/// A [`Race`] that rebuilds its candidate set from a [`Pool`] on every call
/// instead of racing a snapshot fixed at construction time, so membership
/// changes (a peer joining or leaving) take effect on the very next call.
pub struct PoolRace {
    pool: Arc<Pool>,
    growth: GrowthFn,
    min: usize,
}

impl PoolRace {
    pub fn new(pool: Arc<Pool>, growth: GrowthFn, min: usize) -> Self {
        Self { pool, growth, min }
    }

    fn current(&self) -> Option<Race> {
        let members = self.pool.members();
        if members.is_empty() {
            return None;
        }
        Some(Race::with_growth(members, self.growth, self.min))
    }
}

fn no_peers() -> StoreError {
    StoreError::Transient(anyhow::anyhow!("pool has no members to race"))
}

#[async_trait]
impl Store for PoolRace {
    async fn put_node(&self, node: Node) -> StoreResult<()> {
        match self.current() {
            Some(race) => race.put_node(node).await,
            None => Err(no_peers()),
        }
    }

    async fn get_node(&self, sum: &Sum) -> StoreResult<Option<Node>> {
        match self.current() {
            Some(race) => race.get_node(sum).await,
            None => Err(no_peers()),
        }
    }

    async fn put_blob(&self, sum: Sum, data: Vec<u8>) -> StoreResult<()> {
        match self.current() {
            Some(race) => race.put_blob(sum, data).await,
            None => Err(no_peers()),
        }
    }

    async fn get_blob(&self, sum: &Sum) -> StoreResult<Option<Vec<u8>>> {
        match self.current() {
            Some(race) => race.get_blob(sum).await,
            None => Err(no_peers()),
        }
    }

    async fn info_blob(&self, sum: &Sum) -> StoreResult<Option<BlobInfo>> {
        match self.current() {
            Some(race) => race.info_blob(sum).await,
            None => Err(no_peers()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use epher_hash::{sum, HashType};

    #[tokio::test]
    async fn race_finds_hit_among_misses() {
        let a = Arc::new(MemoryStore::named("a"));
        let b = Arc::new(MemoryStore::named("b"));
        let s = sum(HashType::Sha1, b"x");
        b.put_blob(s.clone(), b"x".to_vec()).await.unwrap();

        let race = Race::new(vec![a, b]);
        assert_eq!(race.get_blob(&s).await.unwrap(), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn race_returns_none_when_all_miss() {
        let a = Arc::new(MemoryStore::named("a"));
        let b = Arc::new(MemoryStore::named("b"));
        let race = Race::new(vec![a, b]);
        let s = sum(HashType::Sha1, b"nope");
        assert_eq!(race.get_blob(&s).await.unwrap(), None);
    }

    #[tokio::test]
    async fn race_put_succeeds_when_any_one_store_accepts_it() {
        let a = Arc::new(MemoryStore::named("a"));
        let b = Arc::new(MemoryStore::named("b"));
        let race = Race::new(vec![a.clone(), b.clone()]);
        let s = sum(HashType::Sha1, b"y");
        race.put_blob(s.clone(), b"y".to_vec()).await.unwrap();
        // At least one of the two sampled stores has it; with only two
        // stores and a floor of 3, both get sampled.
        let got_a = a.get_blob(&s).await.unwrap();
        let got_b = b.get_blob(&s).await.unwrap();
        assert!(got_a.is_some() || got_b.is_some());
    }

    #[tokio::test]
    async fn race_put_falls_through_when_the_first_draw_errors() {
        let s = sum(HashType::Sha1, b"z");
        let race = Race::with_growth(
            vec![Arc::new(AlwaysErrors), Arc::new(MemoryStore::named("b"))],
            growth_log2,
            2,
        );
        race.put_blob(s.clone(), b"z".to_vec()).await.unwrap();
    }

    struct AlwaysErrors;

    #[async_trait]
    impl Store for AlwaysErrors {
        async fn put_node(&self, _node: Node) -> StoreResult<()> {
            Err(crate::error::StoreError::Transient(anyhow::anyhow!("down")))
        }
        async fn get_node(&self, _sum: &Sum) -> StoreResult<Option<Node>> {
            Err(crate::error::StoreError::Transient(anyhow::anyhow!("down")))
        }
        async fn put_blob(&self, _sum: Sum, _data: Vec<u8>) -> StoreResult<()> {
            Err(crate::error::StoreError::Transient(anyhow::anyhow!("down")))
        }
        async fn get_blob(&self, _sum: &Sum) -> StoreResult<Option<Vec<u8>>> {
            Err(crate::error::StoreError::Transient(anyhow::anyhow!("down")))
        }
        async fn info_blob(&self, _sum: &Sum) -> StoreResult<Option<BlobInfo>> {
            Err(crate::error::StoreError::Transient(anyhow::anyhow!("down")))
        }
    }

    #[test]
    fn growth_log2_square_grows_faster_than_log2() {
        assert!(growth_log2_square(16) >= growth_log2(16));
    }

    #[test]
    fn min_floor_is_honored_even_when_growth_picks_fewer() {
        // growth_log2(2) == 1, but a min of 3 should still cap at the pool size.
        assert_eq!(growth_log2(2).max(3).min(2), 2);
    }

    #[tokio::test]
    async fn pool_race_picks_up_a_member_added_after_construction() {
        let pool = Arc::new(Pool::new());
        let race = PoolRace::new(pool.clone(), growth_log2, 1);
        let s = sum(HashType::Sha1, b"late");

        assert!(race.get_blob(&s).await.is_err());

        let store = Arc::new(MemoryStore::named("late-joiner"));
        store.put_blob(s.clone(), b"late".to_vec()).await.unwrap();
        pool.put("late-joiner", store);

        assert_eq!(race.get_blob(&s).await.unwrap(), Some(b"late".to_vec()));
    }
}
