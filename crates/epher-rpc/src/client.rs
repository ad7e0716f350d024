use crate::sumparam;
use async_trait::async_trait;
use epher_hash::Sum;
use epher_store::{BlobInfo, Node, Store, StoreError, StoreResult};
use reqwest::{Client, StatusCode};
use tracing::instrument;

/// A `Store` backed by one remote peer's [`crate::server::router`], speaking
/// the same binary wire format over plain HTTP.
pub struct RpcClient {
    base_url: String,
    http: Client,
}

impl RpcClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, http }
    }

    fn transient(err: reqwest::Error) -> StoreError {
        StoreError::Transient(anyhow::anyhow!(err))
    }
}

#[async_trait]
impl Store for RpcClient {
    #[instrument(name = "rpcClient.PutNode", skip(self, node))]
    async fn put_node(&self, node: Node) -> StoreResult<()> {
        let mut buf = Vec::new();
        epher_codec::encode_node(&mut buf, &node)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        let resp = self
            .http
            .put(format!("{}/v1/nodes", self.base_url))
            .body(buf)
            .send()
            .await
            .map_err(Self::transient)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Transient(anyhow::anyhow!(
                "put_node: peer returned {}",
                resp.status()
            )))
        }
    }

    #[instrument(name = "rpcClient.GetNode", skip(self))]
    async fn get_node(&self, sum: &Sum) -> StoreResult<Option<Node>> {
        let resp = self
            .http
            .get(format!("{}/v1/nodes", self.base_url))
            .query(&[("sum", sumparam::format(sum))])
            .send()
            .await
            .map_err(Self::transient)?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = resp.bytes().await.map_err(Self::transient)?;
                let node = epher_codec::decode_node(&mut &body[..])
                    .map_err(|e| StoreError::Malformed(e.to_string()))?;
                Ok(Some(node))
            }
            status => Err(StoreError::Transient(anyhow::anyhow!(
                "get_node: peer returned {status}"
            ))),
        }
    }

    #[instrument(name = "rpcClient.PutBlob", skip(self, data))]
    async fn put_blob(&self, sum: Sum, data: Vec<u8>) -> StoreResult<()> {
        let resp = self
            .http
            .put(format!("{}/v1/blobs", self.base_url))
            .query(&[("sum", sumparam::format(&sum))])
            .body(data)
            .send()
            .await
            .map_err(Self::transient)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Transient(anyhow::anyhow!(
                "put_blob: peer returned {}",
                resp.status()
            )))
        }
    }

    #[instrument(name = "rpcClient.GetBlob", skip(self))]
    async fn get_blob(&self, sum: &Sum) -> StoreResult<Option<Vec<u8>>> {
        let resp = self
            .http
            .get(format!("{}/v1/blobs", self.base_url))
            .query(&[("sum", sumparam::format(sum))])
            .send()
            .await
            .map_err(Self::transient)?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                Ok(Some(resp.bytes().await.map_err(Self::transient)?.to_vec()))
            }
            status => Err(StoreError::Transient(anyhow::anyhow!(
                "get_blob: peer returned {status}"
            ))),
        }
    }

    #[instrument(name = "rpcClient.InfoBlob", skip(self))]
    async fn info_blob(&self, sum: &Sum) -> StoreResult<Option<BlobInfo>> {
        let resp = self
            .http
            .head(format!("{}/v1/blobs", self.base_url))
            .query(&[("sum", sumparam::format(sum))])
            .send()
            .await
            .map_err(Self::transient)?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = resp.bytes().await.map_err(Self::transient)?;
                let info = epher_codec::decode_blob_info(&mut &body[..])
                    .map_err(|e| StoreError::Malformed(e.to_string()))?;
                Ok(Some(info))
            }
            status => Err(StoreError::Transient(anyhow::anyhow!(
                "info_blob: peer returned {status}"
            ))),
        }
    }
}
