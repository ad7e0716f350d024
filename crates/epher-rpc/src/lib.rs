//! HTTP transport for a [`epher_store::Store`]: a server exposing one over
//! axum, and a client consuming a remote one over reqwest.

mod client;
mod server;
mod sumparam;

pub use client::RpcClient;
pub use server::router;
