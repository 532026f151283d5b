//! Cluster handlers.

use crate::api::error::ApiError;
use crate::api::request;
use crate::api::response;
use crate::router::KvRouter;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::sync::Arc;

/// POST /join?peerAddress=ADDR
///
/// Admit ADDR as a voter. Must reach the leader.
pub async fn join(req: Request<Incoming>, router: Arc<KvRouter>) -> Response<Full<Bytes>> {
    let peer = match request::query_param(req.uri(), "peerAddress") {
        Ok(peer) => peer,
        Err(e) => return ApiError::from(e).into_response(),
    };

    match router.admit(peer.as_deref()).await {
        Ok(()) => response::ok_empty(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// GET /status
///
/// `{"isLeader": bool, "leader": "addr", "term": n}` as this node sees it.
pub fn status(router: Arc<KvRouter>) -> Response<Full<Bytes>> {
    match router.status() {
        Ok(status) => response::ok(&status),
        Err(e) => ApiError::from(e).into_response(),
    }
}
