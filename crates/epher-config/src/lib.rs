//! Process-wide configuration: the CLI/env-driven options every `epher`
//! entry point parses at startup.

use clap::Parser;
use epher_hash::HashType;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// `$HOME/.epher`, falling back to the current directory if `$HOME` isn't
/// set — the default root new nodes persist their data and config under.
pub static DEFAULT_HOME_DIR: Lazy<PathBuf> = Lazy::new(|| {
    dirs_home().unwrap_or_else(|| PathBuf::from("."))
        .join(".epher")
});

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown hash type {0:?}, expected one of: blake2b512, sha1, sha3")]
    UnknownHashType(String),

    #[error("invalid peer address {0:?}: {1}")]
    InvalidPeerAddr(String, std::net::AddrParseError),
}

fn parse_hash_type(raw: &str) -> Result<HashType, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "blake2b512" | "blake2b" | "blake2" => Ok(HashType::Blake2b512),
        "sha1" => Ok(HashType::Sha1),
        "sha3" | "sha3-512" => Ok(HashType::Sha3),
        _ => Err(ConfigError::UnknownHashType(raw.to_string())),
    }
}

/// Options shared by every `epher` binary invocation: where the node
/// listens, which peers it races/layers its store over, and the chunking
/// and hashing parameters new blobs are written with.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "epher", about = "A highly-available content-addressable blob store")]
pub struct EpherOpt {
    /// Address this node's HTTP store RPC server listens on.
    #[arg(long, env = "EPHER_LISTEN", default_value = "127.0.0.1:7780")]
    pub listen: String,

    /// Address the Prometheus metrics endpoint listens on.
    #[arg(long, env = "EPHER_METRICS_LISTEN", default_value = "127.0.0.1:7781")]
    pub metrics_listen: String,

    /// Directory the local store backend persists data under.
    #[arg(long, env = "EPHER_DATA_DIR", default_value = "./epher-data")]
    pub data_dir: PathBuf,

    /// Addresses of peer nodes this node's combinator stack races/layers
    /// requests over, in addition to its own local store.
    #[arg(long, env = "EPHER_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Hash algorithm new blobs and merkle nodes are written with.
    #[arg(long, env = "EPHER_HASH_TYPE", default_value = "blake2b512", value_parser = parse_hash_type)]
    pub hash_type: HashType,

    /// Maximum size, in bytes, of a single chunked blob.
    #[arg(long, env = "EPHER_BLOB_SIZE", default_value_t = 4 << 20)]
    pub blob_size: usize,
}

impl EpherOpt {
    pub fn peer_addrs(&self) -> Result<Vec<std::net::SocketAddr>, ConfigError> {
        self.peers
            .iter()
            .map(|raw| {
                raw.parse()
                    .map_err(|e| ConfigError::InvalidPeerAddr(raw.clone(), e))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults_from_bare_invocation() {
        let opt = EpherOpt::parse_from(["epher"]);
        assert_eq!(opt.listen, "127.0.0.1:7780");
        assert_eq!(opt.hash_type, HashType::Blake2b512);
        assert!(opt.peers.is_empty());
    }

    #[test]
    fn parses_peers_as_comma_delimited_list() {
        let opt = EpherOpt::parse_from(["epher", "--peers", "10.0.0.1:7780,10.0.0.2:7780"]);
        assert_eq!(opt.peers.len(), 2);
        let addrs = opt.peer_addrs().unwrap();
        assert_eq!(addrs.len(), 2);
    }

    #[test]
    fn rejects_unknown_hash_type() {
        assert!(parse_hash_type("md5").is_err());
        assert!(parse_hash_type("SHA1").is_ok());
    }
}
