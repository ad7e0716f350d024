mod commands;

use clap::{Parser, Subcommand};
use std::process::exit;

#[cfg(not(target_env = "msvc"))]
mod allocator {
    use tikv_jemallocator::Jemalloc;

    pub type Allocator = Jemalloc;

    pub const fn allocator() -> Allocator {
        Jemalloc
    }
}

#[cfg(target_env = "msvc")]
mod allocator {
    use mimalloc::MiMalloc;

    pub type Allocator = MiMalloc;

    pub const fn allocator() -> Allocator {
        MiMalloc
    }
}

#[global_allocator]
static GLOBAL: allocator::Allocator = allocator::allocator();

/// epher is a highly-available, content-addressable blob store.
#[derive(Parser)]
#[command(name = "epher", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs a storage node: the store RPC server and metrics endpoint.
    Node(commands::node::NodeArgs),
    /// Puts, gets, or inspects blobs against a running node.
    Blob {
        #[command(subcommand)]
        command: commands::blob::BlobCommand,
    },
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Node(args) => commands::node::run(args).await,
        Command::Blob { command } => commands::blob::run(command).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        exit(1);
    }
}
