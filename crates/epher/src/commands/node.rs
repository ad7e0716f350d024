use anyhow::Result;
use clap::Args;
use epher_config::EpherOpt;
use epher_store::{MemoryStore, Store};
use std::sync::Arc;
use tracing::info;

#[derive(Args)]
pub struct NodeArgs {
    #[command(flatten)]
    pub opt: EpherOpt,
}

pub async fn run(args: NodeArgs) -> Result<()> {
    let local: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let handle = epher_service::start(&args.opt, local).await?;

    info!(
        store_addr = %handle.store_addr(),
        metrics_addr = %handle.metrics_addr(),
        "node started, waiting for shutdown signal"
    );

    tokio::signal::ctrl_c().await?;
    handle.shutdown();
    Ok(())
}
