//! HTTP server for handling Raft RPC requests.

use crate::http::serve_connections;
use crate::types::{KvNodeId, KvRaft, TypeConfig};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use openraft::raft::{AppendEntriesRequest, InstallSnapshotRequest, VoteRequest};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use super::{APPEND_PATH, SNAPSHOT_PATH, VOTE_PATH};

/// Serves Raft RPCs from peers on the node's raft address.
#[derive(Clone)]
pub struct RaftServer {
    /// Reference to the Raft instance.
    raft: Arc<KvRaft>,
}

impl RaftServer {
    /// Create a new Raft server.
    pub fn new(raft: Arc<KvRaft>) -> Self {
        Self { raft }
    }

    /// Serve until `shutdown` flips to `true`.
    pub async fn serve(self, listener: TcpListener, shutdown: watch::Receiver<bool>) {
        let server = Arc::new(self);
        serve_connections("raft", listener, shutdown, move |req| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle(req).await) }
        })
        .await;
    }

    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        if req.method() != Method::POST {
            return plain(StatusCode::METHOD_NOT_ALLOWED, "raft RPCs use POST");
        }

        let path = req.uri().path().to_string();
        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => return plain(StatusCode::BAD_REQUEST, &e.to_string()),
        };

        match path.as_str() {
            APPEND_PATH => match decode::<AppendEntriesRequest<TypeConfig>>(&body) {
                Ok(rpc) => reply(&self.raft.append_entries(rpc).await),
                Err(resp) => resp,
            },
            VOTE_PATH => match decode::<VoteRequest<KvNodeId>>(&body) {
                Ok(rpc) => reply(&self.raft.vote(rpc).await),
                Err(resp) => resp,
            },
            SNAPSHOT_PATH => match decode::<InstallSnapshotRequest<TypeConfig>>(&body) {
                Ok(rpc) => reply(&self.raft.install_snapshot(rpc).await),
                Err(resp) => resp,
            },
            _ => plain(StatusCode::NOT_FOUND, "unknown raft RPC"),
        }
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response<Full<Bytes>>> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "rejecting malformed raft RPC");
        plain(StatusCode::BAD_REQUEST, &e.to_string())
    })
}

/// Encode the raft result, error included, for the calling peer.
fn reply<T: Serialize>(result: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(result) {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_else(|_| plain(StatusCode::INTERNAL_SERVER_ERROR, "")),
        Err(e) => plain(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn plain(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
    *response.status_mut() = status;
    response
}
