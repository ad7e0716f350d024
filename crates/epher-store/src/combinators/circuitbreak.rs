use crate::error::StoreResult;
use crate::metrics::metrics;
use crate::store::Store;
use crate::types::{BlobInfo, Node};
use async_trait::async_trait;
use epher_hash::Sum;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

impl State {
    fn gauge_value(self) -> i64 {
        match self {
            State::Closed => 0,
            State::Open => 1,
            State::HalfOpen => 2,
        }
    }
}

struct Inner {
    state: State,
    failures: u32,
    opened_at: Option<Instant>,
}

/// A fixed-threshold breaker in front of `primary`: opens after
/// `failure_threshold` consecutive failures, stays open for `cooldown`
/// routing every call to `fallback` without touching `primary`, then allows
/// one probe call through to `primary` (half-open) before closing again on
/// success or re-opening on failure.
pub struct CircuitBreak {
    primary: Arc<dyn Store>,
    fallback: Arc<dyn Store>,
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<Inner>,
}

impl CircuitBreak {
    /// `failure_threshold = 3`, `cooldown = 5s` mirror the breaker the
    /// original service wired in front of every remote store.
    pub fn new(primary: Arc<dyn Store>, fallback: Arc<dyn Store>, name: impl Into<String>) -> Self {
        Self::with_params(primary, fallback, name, 3, Duration::from_secs(5))
    }

    pub fn with_params(
        primary: Arc<dyn Store>,
        fallback: Arc<dyn Store>,
        name: impl Into<String>,
        failure_threshold: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            name: name.into(),
            failure_threshold,
            cooldown,
            state: Mutex::new(Inner {
                state: State::Closed,
                failures: 0,
                opened_at: None,
            }),
        }
    }

    fn set_gauge(&self, state: State) {
        metrics()
            .circuit_breaker_state
            .with_label_values(&[&self.name])
            .set(state.gauge_value());
    }

    /// Returns `true` if `primary` should be tried, `false` if the breaker
    /// is open and the call should go straight to `fallback` instead.
    fn admit(&self) -> bool {
        let mut inner = self.state.lock();
        match inner.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.cooldown {
                    inner.state = State::HalfOpen;
                    drop(inner);
                    self.set_gauge(State::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.state.lock();
        inner.failures = 0;
        inner.state = State::Closed;
        inner.opened_at = None;
        drop(inner);
        self.set_gauge(State::Closed);
    }

    fn on_failure(&self) {
        let mut inner = self.state.lock();
        match inner.state {
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                drop(inner);
                self.set_gauge(State::Open);
            }
            State::Closed => {
                inner.failures += 1;
                if inner.failures >= self.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                    drop(inner);
                    self.set_gauge(State::Open);
                }
            }
            State::Open => {}
        }
    }

    /// Routes to `fallback` while open; otherwise calls `primary` and
    /// updates the breaker's failure bookkeeping from the result.
    async fn guarded<T, P, PFut, F, FFut>(&self, primary: P, fallback: F) -> StoreResult<T>
    where
        P: FnOnce() -> PFut,
        PFut: std::future::Future<Output = StoreResult<T>>,
        F: FnOnce() -> FFut,
        FFut: std::future::Future<Output = StoreResult<T>>,
    {
        if !self.admit() {
            return fallback().await;
        }
        match primary().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Store for CircuitBreak {
    async fn put_node(&self, node: Node) -> StoreResult<()> {
        let for_fallback = node.clone();
        self.guarded(
            || self.primary.put_node(node),
            || self.fallback.put_node(for_fallback),
        )
        .await
    }

    async fn get_node(&self, sum: &Sum) -> StoreResult<Option<Node>> {
        self.guarded(|| self.primary.get_node(sum), || self.fallback.get_node(sum))
            .await
    }

    async fn put_blob(&self, sum: Sum, data: Vec<u8>) -> StoreResult<()> {
        let (sum_fb, data_fb) = (sum.clone(), data.clone());
        self.guarded(
            || self.primary.put_blob(sum, data),
            || self.fallback.put_blob(sum_fb, data_fb),
        )
        .await
    }

    async fn get_blob(&self, sum: &Sum) -> StoreResult<Option<Vec<u8>>> {
        self.guarded(|| self.primary.get_blob(sum), || self.fallback.get_blob(sum))
            .await
    }

    async fn info_blob(&self, sum: &Sum) -> StoreResult<Option<BlobInfo>> {
        self.guarded(
            || self.primary.info_blob(sum),
            || self.fallback.info_blob(sum),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use epher_hash::{sum, HashType};

    struct AlwaysFails;

    #[async_trait]
    impl Store for AlwaysFails {
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
    async fn opens_after_threshold_failures_and_routes_to_fallback() {
        let fallback = Arc::new(MemoryStore::named("fallback"));
        let s = sum(HashType::Sha1, b"x");
        fallback.put_blob(s.clone(), b"from-fallback".to_vec()).await.unwrap();

        let breaker = CircuitBreak::with_params(
            Arc::new(AlwaysFails),
            fallback,
            "flaky",
            2,
            Duration::from_secs(60),
        );

        assert!(breaker.get_blob(&s).await.is_err());
        assert!(breaker.get_blob(&s).await.is_err());
        assert_eq!(breaker.state.lock().state, State::Open);

        // Third call: breaker open, routed straight to fallback instead of
        // touching the (still failing) primary.
        let got = breaker.get_blob(&s).await.unwrap();
        assert_eq!(got, Some(b"from-fallback".to_vec()));
    }

    #[tokio::test]
    async fn closes_again_on_success() {
        let inner = Arc::new(MemoryStore::new());
        let fallback = Arc::new(MemoryStore::named("fallback"));
        let breaker = CircuitBreak::new(inner, fallback, "healthy");
        let s = sum(HashType::Sha1, b"y");
        breaker.put_blob(s.clone(), b"y".to_vec()).await.unwrap();
        assert_eq!(breaker.get_blob(&s).await.unwrap(), Some(b"y".to_vec()));
        assert_eq!(breaker.state.lock().state, State::Closed);
    }
}
