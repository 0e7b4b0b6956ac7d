//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::router;
use crate::error::Result;
use crate::flood::FloodControlBackend;

/// HTTP server fronting a flood control gate.
pub struct HttpServer<B: FloodControlBackend<i64> + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The flood control gate
    gate: Arc<B>,
}

impl<B: FloodControlBackend<i64> + 'static> HttpServer<B> {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, gate: Arc<B>) -> Self {
        Self { addr, gate }
    }

    /// Bind the configured address and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;
        self.serve_listener(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            addr = %listener.local_addr()?,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(listener, router(self.gate))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}
