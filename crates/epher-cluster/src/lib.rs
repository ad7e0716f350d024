//! Cluster membership as seen by the storage layer. This crate only
//! describes the contract a gossip/membership implementation must satisfy
//! to drive an [`epher_store::combinators::pool::Pool`] — it doesn't ship
//! one. A production deployment wires in a real `Discovery`
//! (memberlist-style gossip, a Kubernetes endpoints watch, etc).

use async_trait::async_trait;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to join cluster: {0}")]
    Join(String),

    #[error("failed to leave cluster: {0}")]
    Leave(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ClusterResult<T> = Result<T, ClusterError>;

/// A node known to the cluster: its address and the logical role it was
/// advertised under (e.g. a shard or zone name), used to decide which
/// remote peers a given combinator should include.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    pub addr: SocketAddr,
    pub role: String,
}

/// Joins and observes membership of a gossip cluster.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn join(&self, seeds: &[SocketAddr]) -> ClusterResult<()>;
    async fn leave(&self) -> ClusterResult<()>;
    fn members(&self) -> Vec<ClusterNode>;
}

/// The view a remote node exposes of the rest of the cluster, as seen from
/// one peer's perspective — what `RemoteCluster` nodes this process would
/// dial to reach peers it is not itself part of.
#[async_trait]
pub trait RemoteCluster: Send + Sync {
    async fn peers(&self) -> ClusterResult<Vec<ClusterNode>>;
}

/// The aggregate a service needs to keep its store combinator stack in
/// sync with cluster membership: local discovery plus the ability to ask
/// any known peer who else is out there.
#[async_trait]
pub trait Cluster: Discovery + RemoteCluster {}

impl<T: Discovery + RemoteCluster> Cluster for T {}
