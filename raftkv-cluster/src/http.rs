//! Shared HTTP/1 accept loop for the raft RPC and client listeners.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Serve connections from `listener` until `shutdown` flips to `true`.
///
/// Each connection runs on its own task. Accept errors are logged and the
/// loop keeps going; they are usually transient (e.g. file descriptor limits).
pub(crate) async fn serve_connections<H, Fut>(
    name: &'static str,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
    handler: H,
) where
    H: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Full<Bytes>>, Infallible>> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(server = name, addr = %addr, "server started");
    }

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, remote_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(server = name, error = %e, "accept failed");
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let handler = handler.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| handler(req));

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        if !e.is_incomplete_message() {
                            tracing::warn!(
                                server = name,
                                remote = %remote_addr,
                                error = %e,
                                "HTTP connection error"
                            );
                        }
                    }
                });
            }
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                tracing::info!(server = name, "server shutting down");
                break;
            }
        }
    }
}
