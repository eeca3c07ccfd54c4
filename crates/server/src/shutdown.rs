//! Graceful shutdown handling.
//!
//! One broadcast channel fans the shutdown signal out to the HTTP server and
//! the TTL sweeper, so both wind down from a single Ctrl-C or SIGTERM.

use tokio::signal;

/// Wait for a shutdown signal (Ctrl-C or SIGTERM).
///
/// Blocks until a signal is received. On Unix, SIGTERM is handled as well for
/// container environments.
#[allow(clippy::expect_used)]
pub async fn shutdown_signal() {
    let ctrl_c = async {
        // If signal handlers cannot be installed the process cannot shut down
        // cleanly, so panicking here is the right outcome.
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

/// Shutdown coordinator for graceful termination.
///
/// Subscribers (the sweeper loop, the HTTP server's graceful-shutdown future)
/// receive one notification when [`shutdown`](Self::shutdown) fires.
pub struct ShutdownCoordinator {
    notify: tokio::sync::broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    #[must_use]
    pub fn new() -> Self {
        let (notify, _) = tokio::sync::broadcast::channel(1);
        Self { notify }
    }

    /// Subscribe to shutdown notifications.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.notify.subscribe()
    }

    /// Trigger shutdown.
    pub fn shutdown(&self) {
        let _ = self.notify.send(());
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn subscribers_receive_the_shutdown_signal() {
        let coordinator = ShutdownCoordinator::new();
        let mut first = coordinator.subscribe();
        let mut second = coordinator.subscribe();

        coordinator.shutdown();

        let received = tokio::time::timeout(Duration::from_secs(1), first.recv()).await;
        assert!(received.is_ok(), "first subscriber should receive the signal");
        let received = tokio::time::timeout(Duration::from_secs(1), second.recv()).await;
        assert!(received.is_ok(), "second subscriber should receive the signal");
    }
}
