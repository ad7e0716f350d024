use async_trait::async_trait;
use epher_hash::Sum;
use tracing::warn;

/// Called when a read through a verified merkle tree detects that a stored
/// node or blob no longer matches its recorded sum.
/// A real implementation re-fetches the object from another replica and
/// writes it back; [`NoopRepairHook`] just logs, which is enough for a
/// single-node deployment with no peer to repair from.
#[async_trait]
pub trait RepairHook: Send + Sync {
    async fn on_invalid(&self, sum: &Sum);
}

pub struct NoopRepairHook;

#[async_trait]
impl RepairHook for NoopRepairHook {
    async fn on_invalid(&self, sum: &Sum) {
        warn!(%sum, "detected invalid object, no repair hook configured");
    }
}
