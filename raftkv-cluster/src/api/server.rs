//! HTTP server setup for the client surface.

use super::router;
use crate::error::KvResult;
use crate::http::serve_connections;
use crate::router::KvRouter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Client-facing HTTP server.
pub struct ApiServer {
    listener: TcpListener,
    router: Arc<KvRouter>,
}

impl ApiServer {
    /// Bind the client address.
    pub async fn bind(addr: &str, router: Arc<KvRouter>) -> KvResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, router })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> KvResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` flips to `true`.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let state = self.router;
        serve_connections("api", self.listener, shutdown, move |req| {
            let state = Arc::clone(&state);
            async move { router::route(req, state).await }
        })
        .await;
    }
}
