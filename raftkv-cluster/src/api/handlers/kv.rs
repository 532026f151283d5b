//! Key-value handlers.

use crate::api::error::ApiError;
use crate::api::request;
use crate::api::response;
use crate::router::{KvRouter, WriteKind, WriteOutcome, WriteRequest};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::collections::HashMap;
use std::sync::Arc;

/// GET /get?key=K
///
/// Local read; answers `{K: value}`.
pub async fn get(req: Request<Incoming>, router: Arc<KvRouter>) -> Response<Full<Bytes>> {
    let key = match request::query_param(req.uri(), "key") {
        Ok(key) => key,
        Err(e) => return ApiError::from(e).into_response(),
    };

    match router.read(key.as_deref()).await {
        Ok(value) => response::ok(&HashMap::from([(key.unwrap_or_default(), value)])),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// POST /set and POST /delete
///
/// Committed here when leading, otherwise relayed from the leader.
pub async fn write(
    req: Request<Incoming>,
    router: Arc<KvRouter>,
    kind: WriteKind,
) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();

    let body = match request::read_body(body).await {
        Ok(body) => body,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let write = WriteRequest {
        kind,
        method: parts.method,
        path_and_query,
        headers: parts.headers,
        body,
    };

    match router.write(write).await {
        Ok(WriteOutcome::Committed) => response::ok_empty(),
        Ok(WriteOutcome::Forwarded(relayed)) => response::relayed(relayed),
        Err(e) => {
            tracing::warn!(?kind, error = %e, "write failed");
            ApiError::from(e).into_response()
        }
    }
}
