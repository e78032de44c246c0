//! Server lifecycle management
//!
//! Binds the HTTP listener, serves the relay routes, and shuts down
//! gracefully on SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use camrelay_core::Config;

pub struct CamRelayServer {
    config: Config,
}

impl CamRelayServer {
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start the HTTP server and wait for a shutdown signal
    pub async fn start(self) -> Result<()> {
        let http_address = self.config.http_address();
        let addr: std::net::SocketAddr = http_address
            .parse()
            .with_context(|| format!("invalid HTTP address '{http_address}'"))?;

        let router = camrelay_api::http::create_router(Arc::new(self.config));

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind HTTP address {addr}"))?;

        info!("HTTP server listening on {addr}");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
