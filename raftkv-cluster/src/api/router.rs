//! Request routing for the API.
//!
//! Routes requests to appropriate handlers based on method and path.

use super::handlers;
use super::response;
use crate::router::{KvRouter, WriteKind};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::sync::Arc;

/// Route an incoming request to the appropriate handler.
pub async fn route(
    req: Request<Incoming>,
    router: Arc<KvRouter>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    tracing::debug!(method = %method, path = %path, "Routing request");

    let response = match (method, path.as_str()) {
        (Method::GET, "/get") => handlers::kv::get(req, router).await,
        (Method::POST, "/set") => handlers::kv::write(req, router, WriteKind::Set).await,
        (Method::POST, "/delete") => handlers::kv::write(req, router, WriteKind::Delete).await,
        (Method::POST, "/join") => handlers::cluster::join(req, router).await,
        (Method::GET, "/status") => handlers::cluster::status(router),

        (_, "/get" | "/status") => response::method_not_allowed(&["GET"]),
        (_, "/set" | "/delete" | "/join") => response::method_not_allowed(&["POST"]),

        // Not found
        _ => response::not_found(),
    };

    Ok(response)
}
