//! Graceful shutdown and signal handling.
//!
//! SIGTERM and SIGINT flip a shared `watch` flag. The HTTP server, the update
//! poller and the relay workers all stop when it turns `true`.

use tokio::sync::watch;

/// Resolve once SIGINT (Ctrl+C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

/// Spawn a task that sets the shutdown flag when a signal arrives.
pub fn setup_shutdown_handler(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        shutdown_signal().await;
        // Receivers may all be gone already
        let _ = tx.send(true);
    });
}

/// Wait until the shutdown flag is set or its sender is dropped.
pub async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
