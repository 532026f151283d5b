//! One-hop forwarding of client writes to the leader.

use crate::error::{KvError, KvResult};
use bytes::Bytes;
use hyper::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, HeaderValue, TRANSFER_ENCODING};
use hyper::{HeaderMap, StatusCode};
use std::time::Duration;

use super::WriteRequest;

/// Header marking a write that was already forwarded once.
pub const FORWARDED_HEADER: &str = "x-raftkv-forwarded";

/// The leader's answer to a forwarded write, relayed as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedResponse {
    /// Leader's status code.
    pub status: StatusCode,
    /// Leader's content type, if it sent one.
    pub content_type: Option<HeaderValue>,
    /// Leader's body.
    pub body: Bytes,
}

/// Sends a write to the leader's client address, exactly once.
///
/// There is no retry: during leader churn a retry loop here would multiply
/// the load on a cluster that is already struggling.
#[derive(Debug, Clone)]
pub struct LeaderForwarder {
    http: reqwest::Client,
}

impl LeaderForwarder {
    /// Create a forwarder whose round trips give up after `timeout`.
    pub fn new(timeout: Duration) -> KvResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { http })
    }

    /// Forward `req` to the leader at `leader_api_addr`.
    pub async fn forward(
        &self,
        leader_api_addr: &str,
        req: &WriteRequest,
    ) -> KvResult<RelayedResponse> {
        let url = format!("http://{}{}", leader_api_addr, req.path_and_query);
        tracing::debug!(%url, method = %req.method, "forwarding write to leader");

        let unavailable = |e: reqwest::Error| KvError::UpstreamUnavailable {
            leader: leader_api_addr.to_string(),
            cause: e.to_string(),
        };

        let response = self
            .http
            .request(req.method.clone(), &url)
            .headers(forwardable_headers(&req.headers))
            .header(FORWARDED_HEADER, "1")
            .body(req.body.clone())
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response.bytes().await.map_err(unavailable)?;

        Ok(RelayedResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Copy request headers, minus the hop-by-hop ones the client recomputes.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in [HOST, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING] {
        out.remove(name);
    }
    out.remove(FORWARDED_HEADER);
    out
}
