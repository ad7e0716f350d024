//! Wires a local store, a set of peer RPC stores, and the combinator stack
//! into one running node: the HTTP store server, a metrics endpoint, and
//! graceful shutdown — the same shape `kanari-rpc-server`'s `ServerHandle`
//! gives the rest of the workspace.

mod repair;

pub use repair::{NoopRepairHook, RepairHook};

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use epher_config::EpherOpt;
use epher_rpc::RpcClient;
use epher_store::combinators::{growth_log2, growth_log2_square, Layer, Log, Pool, PoolRace, SingleFlight};
use epher_store::{MemoryStore, Store};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Builds the store a node serves requests from: its own local store
/// cascaded in front of two race tiers over every configured peer — a
/// cheap `log2`-sized draw first, a wider `log2^2` draw second if that one
/// comes up empty — with reads for identical sums coalesced and every tier
/// logged. Mirrors the original service's
/// `Log(SingleFlight(Layer(local, Log(Race(...)), Log(Race(...)))))`
/// assembly; peers are held in a [`Pool`] so each race rebuilds its
/// candidate set from current membership instead of a snapshot fixed at
/// startup.
pub fn assemble_store(local: Arc<dyn Store>, peers: &[String]) -> Arc<dyn Store> {
    let mut layers: Vec<Arc<dyn Store>> = vec![local];

    if !peers.is_empty() {
        let pool = Arc::new(Pool::new());
        for addr in peers {
            let client: Arc<dyn Store> = Arc::new(RpcClient::new(format!("http://{addr}")));
            pool.put(addr.clone(), client);
        }

        let small_race = Arc::new(PoolRace::new(pool.clone(), growth_log2, 3)) as Arc<dyn Store>;
        let large_race = Arc::new(PoolRace::new(pool, growth_log2_square, 9)) as Arc<dyn Store>;
        layers.push(Arc::new(Log::new(small_race, "race-small")));
        layers.push(Arc::new(Log::new(large_race, "race-large")));
    }

    let layered = Arc::new(Layer::new(layers)) as Arc<dyn Store>;
    let single_flight = Arc::new(SingleFlight::new(layered)) as Arc<dyn Store>;
    Arc::new(Log::new(single_flight, "node"))
}

/// A running node: its store HTTP server and metrics endpoint, stoppable
/// by dropping or explicitly calling [`ServiceHandle::shutdown`].
pub struct ServiceHandle {
    shutdown_tx: broadcast::Sender<()>,
    store_addr: SocketAddr,
    metrics_addr: SocketAddr,
}

impl ServiceHandle {
    pub fn store_addr(&self) -> SocketAddr {
        self.store_addr
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        self.metrics_addr
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn metrics_handler() -> String {
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buf).expect("encode metrics");
    String::from_utf8(buf).expect("prometheus metrics are valid utf8")
}

/// Starts the store RPC server and metrics endpoint for one node, using
/// `local` as this node's own storage and `opt.peers` as the rest of the
/// cluster it races/layers over.
pub async fn start(opt: &EpherOpt, local: Arc<dyn Store>) -> anyhow::Result<ServiceHandle> {
    epher_store::metrics::init_metrics(prometheus::default_registry());

    let store = assemble_store(local, &opt.peers);

    let store_listener = TcpListener::bind(&opt.listen)
        .await
        .with_context(|| format!("binding store listener on {}", opt.listen))?;
    let store_addr = store_listener.local_addr()?;

    let metrics_listener = TcpListener::bind(&opt.metrics_listen)
        .await
        .with_context(|| format!("binding metrics listener on {}", opt.metrics_listen))?;
    let metrics_addr = metrics_listener.local_addr()?;

    let (shutdown_tx, _) = broadcast::channel(1);

    let store_router = epher_rpc::router(store);
    let mut store_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        info!(%store_addr, "store rpc server listening");
        let _ = axum::serve(store_listener, store_router)
            .with_graceful_shutdown(async move {
                let _ = store_shutdown.recv().await;
            })
            .await;
    });

    let metrics_router = Router::new().route("/metrics", get(metrics_handler));
    let mut metrics_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        info!(%metrics_addr, "metrics server listening");
        let _ = axum::serve(metrics_listener, metrics_router)
            .with_graceful_shutdown(async move {
                let _ = metrics_shutdown.recv().await;
            })
            .await;
    });

    Ok(ServiceHandle {
        shutdown_tx,
        store_addr,
        metrics_addr,
    })
}
