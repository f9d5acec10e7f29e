//! HTTP server startup logic.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::{HttpServerConfig, SHUTDOWN_GRACE_SECS};

use super::shutdown::wait_for_shutdown;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid http.host or http.port: {0}")]
    Address(String),

    #[error("Failed to bind server: {0}")]
    Bind(#[source] std::io::Error),

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Bind the configured address.
///
/// Binding happens before the bot starts so the health check answers while
/// the rest of the service comes up.
pub async fn bind(config: &HttpServerConfig) -> Result<TcpListener, ServerError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e: std::net::AddrParseError| ServerError::Address(e.to_string()))?;
    let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
    tracing::info!(%addr, "HTTP server listening");
    Ok(listener)
}

/// Serve `app` until the shutdown flag is set.
///
/// In-flight requests get [`SHUTDOWN_GRACE_SECS`] to finish.
pub async fn start_server(
    listener: TcpListener,
    app: Router,
    shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let graceful = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
        .into_future();

    let deadline = async {
        wait_for_shutdown(shutdown).await;
        tracing::info!(
            "Graceful shutdown initiated, waiting up to {} seconds for connections to close",
            SHUTDOWN_GRACE_SECS
        );
        tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_SECS)).await;
    };

    tokio::select! {
        result = graceful => result.map_err(ServerError::Serve),
        _ = deadline => {
            tracing::warn!("Grace period expired, closing remaining connections");
            Ok(())
        }
    }
}
