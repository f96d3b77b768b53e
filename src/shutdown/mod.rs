//! Graceful shutdown.
//!
//! 1. Notify every connected client (through the delivery path)
//! 2. Signal background tasks to stop
//! 3. Remove and close every connection

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::manager::UnifiedWebSocketManager;
use crate::websocket::ServerMessage;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for clients to be notified (default: 5 seconds)
    pub client_notification_timeout: Duration,
    /// Suggested reconnect delay to send to clients (default: 5 seconds)
    pub reconnect_after_seconds: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            client_notification_timeout: Duration::from_secs(5),
            reconnect_after_seconds: 5,
        }
    }
}

pub struct GracefulShutdown {
    manager: Arc<UnifiedWebSocketManager>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(manager: Arc<UnifiedWebSocketManager>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(manager, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        manager: Arc<UnifiedWebSocketManager>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            manager,
            shutdown_tx,
            config,
        }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.manager.connection_count())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Notifying clients");
        result.clients_notified = self.notify_clients(reason).await;

        tracing::info!("Phase 2: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 3: Closing connections");
        result.connections_closed = self.manager.close_all().await;

        result.duration = start.elapsed();
        result.success = self.manager.connection_count() == 0;

        tracing::info!(
            clients_notified = result.clients_notified,
            connections_closed = result.connections_closed,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    async fn notify_clients(&self, reason: &str) -> usize {
        if self.manager.connection_count() == 0 {
            return 0;
        }

        let message = ServerMessage::shutdown(reason, self.config.reconnect_after_seconds);
        match timeout(
            self.config.client_notification_timeout,
            self.manager.broadcast(message),
        )
        .await
        {
            Ok(report) => {
                tracing::info!(
                    notified = report.delivered,
                    failed = report.failed,
                    "Shutdown notifications sent"
                );
                report.delivered
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.client_notification_timeout.as_millis() as u64,
                    "Timed out sending shutdown notifications"
                );
                0
            }
        }
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every connection was closed
    pub success: bool,
    /// Number of clients that were notified
    pub clients_notified: usize,
    /// Number of connections closed by the server
    pub connections_closed: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}
