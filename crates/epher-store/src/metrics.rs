use once_cell::sync::OnceCell;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry, IntCounterVec,
    IntGaugeVec, Registry,
};

/// Store-wide prometheus instrumentation, following the teacher's pattern of
/// a single `OnceCell`-backed metrics struct registered once at process
/// startup and cloned (cheaply, it's all `Arc` internally) into every
/// combinator that needs to record something.
pub struct StoreMetrics {
    pub calls_total: IntCounterVec,
    pub errors_total: IntCounterVec,
    pub circuit_breaker_state: IntGaugeVec,
    pub singleflight_dedup_total: IntCounterVec,
    pub race_winner_total: IntCounterVec,
}

impl StoreMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            calls_total: register_int_counter_vec_with_registry!(
                "epher_store_calls_total",
                "Number of Store method invocations",
                &["op", "backend"],
                registry
            )?,
            errors_total: register_int_counter_vec_with_registry!(
                "epher_store_errors_total",
                "Number of Store method invocations that returned an error",
                &["op", "backend"],
                registry
            )?,
            circuit_breaker_state: register_int_gauge_vec_with_registry!(
                "epher_store_circuit_breaker_state",
                "Circuit breaker state per guarded backend (0=closed, 1=open, 2=half-open)",
                &["backend"],
                registry
            )?,
            singleflight_dedup_total: register_int_counter_vec_with_registry!(
                "epher_store_singleflight_dedup_total",
                "Number of calls that were coalesced onto an in-flight call",
                &["op"],
                registry
            )?,
            race_winner_total: register_int_counter_vec_with_registry!(
                "epher_store_race_winner_total",
                "Number of times a given backend index won a race",
                &["op", "winner_index"],
                registry
            )?,
        })
    }
}

static METRICS: OnceCell<StoreMetrics> = OnceCell::new();

/// Initializes the global store metrics against `registry`. Idempotent:
/// subsequent calls are no-ops, mirroring `moveos-metrics`'s `init_metrics`.
pub fn init_metrics(registry: &Registry) {
    let _ = METRICS.set(StoreMetrics::new(registry).expect("register epher-store metrics"));
}

/// Returns the process-wide store metrics, lazily registering them against
/// the default registry if nothing called [`init_metrics`] yet. Tests and
/// small tools that never wire a registry still get working counters.
pub fn metrics() -> &'static StoreMetrics {
    METRICS.get_or_init(|| {
        StoreMetrics::new(prometheus::default_registry()).expect("register epher-store metrics")
    })
}
