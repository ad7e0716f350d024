use crate::sumparam;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::Router;
use epher_store::{Store, StoreError};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::instrument;

#[derive(Deserialize)]
pub struct SumQuery {
    sum: String,
}

fn store_err_response(err: StoreError) -> Response {
    match err {
        StoreError::Malformed(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
        StoreError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled").into_response(),
        StoreError::Transient(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
        StoreError::Hash(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        StoreError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[instrument(name = "rpcServer.PUT.Node", skip(store, body))]
async fn put_node(State(store): State<Arc<dyn Store>>, body: Bytes) -> Response {
    let node = match epher_codec::decode_node(&mut &body[..]) {
        Ok(node) => node,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    match store.put_node(node).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => store_err_response(e),
    }
}

#[instrument(name = "rpcServer.GET.Node", skip(store))]
async fn get_node(State(store): State<Arc<dyn Store>>, Query(q): Query<SumQuery>) -> Response {
    let sum = match sumparam::parse(&q.sum) {
        Ok(sum) => sum,
        Err(e) => return store_err_response(e),
    };
    match store.get_node(&sum).await {
        Ok(Some(node)) => {
            let mut buf = Vec::new();
            if let Err(e) = epher_codec::encode_node(&mut buf, &node) {
                return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
            }
            (StatusCode::OK, buf).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_err_response(e),
    }
}

#[instrument(name = "rpcServer.PUT.Blob", skip(store, body))]
async fn put_blob(
    State(store): State<Arc<dyn Store>>,
    Query(q): Query<SumQuery>,
    body: Bytes,
) -> Response {
    let sum = match sumparam::parse(&q.sum) {
        Ok(sum) => sum,
        Err(e) => return store_err_response(e),
    };
    match store.put_blob(sum, body.to_vec()).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => store_err_response(e),
    }
}

#[instrument(name = "rpcServer.GET.Blob", skip(store))]
async fn get_blob(State(store): State<Arc<dyn Store>>, Query(q): Query<SumQuery>) -> Response {
    let sum = match sumparam::parse(&q.sum) {
        Ok(sum) => sum,
        Err(e) => return store_err_response(e),
    };
    match store.get_blob(&sum).await {
        Ok(Some(data)) => (StatusCode::OK, data).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_err_response(e),
    }
}

#[instrument(name = "rpcServer.HEAD.Blob", skip(store))]
async fn head_blob(State(store): State<Arc<dyn Store>>, Query(q): Query<SumQuery>) -> Response {
    let sum = match sumparam::parse(&q.sum) {
        Ok(sum) => sum,
        Err(e) => return store_err_response(e),
    };
    match store.info_blob(&sum).await {
        Ok(Some(info)) => {
            let mut buf = Vec::new();
            if let Err(e) = epher_codec::encode_blob_info(&mut buf, &info) {
                return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
            }
            (StatusCode::OK, buf).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_err_response(e),
    }
}

/// Builds the axum router backing a store over HTTP: `PUT`/`GET /v1/nodes`
/// and `PUT`/`GET`/`HEAD /v1/blobs`, all with binary bodies (no JSON
/// envelope), traced the way the rest of the stack traces its spans.
pub fn router(store: Arc<dyn Store>) -> Router {
    Router::new()
        .route("/v1/nodes", put(put_node).get(get_node))
        .route("/v1/blobs", put(put_blob).get(get_blob).head(head_blob))
        .with_state(store)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use epher_hash::{sum, HashType};
    use epher_store::MemoryStore;
    use tower::ServiceExt;

    #[tokio::test]
    async fn put_then_get_blob_over_http() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let app = router(store);
        let s = sum(HashType::Sha1, b"hello");
        let param = sumparam::format(&s);

        let put_req = Request::builder()
            .method("PUT")
            .uri(format!("/v1/blobs?sum={param}"))
            .body(Body::from("hello"))
            .unwrap();
        let resp = app.clone().oneshot(put_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let get_req = Request::builder()
            .method("GET")
            .uri(format!("/v1/blobs?sum={param}"))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(get_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn get_missing_blob_is_404() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let app = router(store);
        let s = sum(HashType::Sha1, b"absent");
        let req = Request::builder()
            .method("GET")
            .uri(format!("/v1/blobs?sum={}", sumparam::format(&s)))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn head_blob_returns_encoded_blob_info() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let s = sum(HashType::Sha1, b"abcdef");
        store.put_blob(s.clone(), b"abcdef".to_vec()).await.unwrap();
        let app = router(store);
        let req = Request::builder()
            .method("HEAD")
            .uri(format!("/v1/blobs?sum={}", sumparam::format(&s)))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let info = epher_codec::decode_blob_info(&mut &body[..]).unwrap();
        assert_eq!(info.sum, s);
        assert_eq!(info.size, 6);
    }
}
