//! Graceful cancellation on SIGINT and SIGTERM.
//!
//! A termination signal stops new uploads from starting; in-flight uploads
//! finish, manifest caches are persisted and autosave is restored before
//! the process exits.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Spawn a task that cancels the token on the first SIGINT or SIGTERM.
pub fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), finishing in-flight uploads before exit...");
            }
            _ = terminate => {
                info!("Received SIGTERM, finishing in-flight uploads before exit...");
            }
        }

        cancel.cancel();
    });
}
