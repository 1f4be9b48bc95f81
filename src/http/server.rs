//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::{router, AppState};
use crate::error::{BulwarkError, Result};
use crate::pow::ProofOfWorkGate;
use crate::ratelimit::RateLimiterBackend;

/// HTTP server for rate limit checks and proof-of-work challenges.
pub struct HttpServer<R: RateLimiterBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    state: AppState<R>,
}

impl<R: RateLimiterBackend + 'static> HttpServer<R> {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<R>, pow: Arc<ProofOfWorkGate>) -> Self {
        Self {
            addr,
            state: AppState { rate_limiter, pow },
        }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server with graceful shutdown");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                BulwarkError::Http(e.to_string())
            })
    }
}
