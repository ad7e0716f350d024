use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use epher_hash::{HashType, Sum};
use epher_rpc::RpcClient;
use epher_store::Store;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum BlobCommand {
    /// Chunks a file (or stdin) into blobs, builds its merkle tree, and
    /// prints the resulting root sum.
    Put(PutArgs),
    /// Retrieves the blob stream rooted at a sum and writes it to stdout
    /// (or a file).
    Get(GetArgs),
    /// Prints the size of a single stored blob.
    Info(InfoArgs),
}

#[derive(Args)]
pub struct PutArgs {
    /// Address of the node to store blobs with.
    #[arg(long)]
    server: String,
    /// File to read; reads stdin if omitted.
    path: Option<PathBuf>,
    /// Hash algorithm to chunk and hash with.
    #[arg(long, default_value = "blake2b512")]
    hash_type: String,
    /// Maximum size, in bytes, of a single chunk.
    #[arg(long, default_value_t = 4 << 20)]
    blob_size: usize,
}

#[derive(Args)]
pub struct GetArgs {
    #[arg(long)]
    server: String,
    /// The root sum to retrieve, as printed by `epher blob put`.
    sum: String,
    /// File to write to; writes stdout if omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
pub struct InfoArgs {
    #[arg(long)]
    server: String,
    sum: String,
}

fn parse_hash_type(raw: &str) -> Result<HashType> {
    match raw.to_ascii_lowercase().as_str() {
        "blake2b512" | "blake2b" | "blake2" => Ok(HashType::Blake2b512),
        "sha1" => Ok(HashType::Sha1),
        "sha3" | "sha3-512" => Ok(HashType::Sha3),
        other => anyhow::bail!("unknown hash type {other:?}"),
    }
}

/// Parses the `"<hash-type>:<hex digest>"` form [`Sum`]'s `Display` impl
/// prints, so a sum from `epher blob put`'s output can be pasted straight
/// back into `epher blob get`/`info`.
fn parse_sum(raw: &str) -> Result<Sum> {
    let (name, hex_digest) = raw
        .split_once(':')
        .with_context(|| format!("malformed sum {raw:?}, expected <hash-type>:<hex digest>"))?;
    let hash_type = parse_hash_type(name)?;
    let digest = hex::decode(hex_digest).with_context(|| format!("malformed hex in {raw:?}"))?;
    Ok(Sum::new(hash_type, digest)?)
}

fn read_input(path: &Option<PathBuf>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match path {
        Some(path) => {
            std::fs::File::open(path)
                .with_context(|| format!("opening {}", path.display()))?
                .read_to_end(&mut buf)?;
        }
        None => {
            std::io::stdin().read_to_end(&mut buf)?;
        }
    }
    Ok(buf)
}

pub async fn run(command: BlobCommand) -> Result<()> {
    match command {
        BlobCommand::Put(args) => put(args).await,
        BlobCommand::Get(args) => get(args).await,
        BlobCommand::Info(args) => info(args).await,
    }
}

async fn put(args: PutArgs) -> Result<()> {
    let hash_type = parse_hash_type(&args.hash_type)?;
    let data = read_input(&args.path)?;

    let store: Arc<dyn Store> = Arc::new(RpcClient::new(format!("http://{}", args.server)));
    let opts = epher_merkle::MerkleOptions::default()
        .with_hash_type(hash_type)
        .with_blob_size(args.blob_size as i64);
    match epher_merkle::build(std::io::Cursor::new(data), &store, opts).await? {
        Some((_tree, root)) => println!("{root}"),
        None => anyhow::bail!("refusing to store an empty blob stream"),
    }
    Ok(())
}

async fn get(args: GetArgs) -> Result<()> {
    let sum = parse_sum(&args.sum)?;
    let store: Arc<dyn Store> = Arc::new(RpcClient::new(format!("http://{}", args.server)));
    let tree = epher_merkle::retrieve_tree(&store, &sum).await?;

    let mut data = Vec::new();
    let (result, invalid) = epher_merkle::retrieve(&tree, &mut data, &store).await;
    result?;
    for node in &invalid {
        eprintln!("warning: {:?} failed verification ({:?})", node.sum, node.reason);
    }

    match args.out {
        Some(path) => std::fs::write(&path, &data).with_context(|| format!("writing {}", path.display()))?,
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&data)?;
        }
    }
    Ok(())
}

async fn info(args: InfoArgs) -> Result<()> {
    let sum = parse_sum(&args.sum)?;
    let store: Arc<dyn Store> = Arc::new(RpcClient::new(format!("http://{}", args.server)));
    match store.info_blob(&sum).await? {
        Some(info) => println!("sum={} size={}", info.sum, info.size),
        None => anyhow::bail!("no such blob: {sum}"),
    }
    Ok(())
}
