use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::manager::UnifiedWebSocketManager;
use crate::metrics::{ConnectionMetrics, HeartbeatMetrics};
use crate::websocket::ServerMessage;

/// Background task for heartbeat and connection cleanup
pub struct HeartbeatTask {
    config: WebSocketConfig,
    manager: Arc<UnifiedWebSocketManager>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        manager: Arc<UnifiedWebSocketManager>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            manager,
            shutdown,
        }
    }

    /// Run the heartbeat and cleanup loops until shutdown
    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval.max(1));
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval.max(1));
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats().await;
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup_stale_connections(connection_timeout).await;
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Broadcast a heartbeat frame; it goes through delivery so the current
    /// mode's decoration applies
    async fn send_heartbeats(&self) {
        if self.manager.connection_count() == 0 {
            return;
        }

        let start = Instant::now();
        let report = self.manager.broadcast(ServerMessage::heartbeat()).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        HeartbeatMetrics::record_duration_ms(elapsed_ms);
        ConnectionMetrics::update(&self.manager.stats().connections);

        tracing::debug!(
            sent = report.delivered,
            failed = report.failed,
            elapsed_ms = elapsed_ms,
            "Heartbeat round completed"
        );

        // Warn if heartbeat round is taking too long
        if elapsed_ms > (self.config.heartbeat_interval * 1000 / 2) {
            tracing::warn!(
                elapsed_ms = elapsed_ms,
                heartbeat_interval_ms = self.config.heartbeat_interval * 1000,
                connections = report.attempted(),
                "Heartbeat round took more than 50% of interval"
            );
        }
    }

    async fn cleanup_stale_connections(&self, timeout_secs: u64) {
        let removed = self.manager.cleanup_stale_connections(timeout_secs).await;

        if removed > 0 {
            tracing::info!(
                removed = removed,
                timeout_secs = timeout_secs,
                "Cleaned up stale connections"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::ConnectionRecord;
    use crate::mode::ManagerMode;
    use crate::test_support::MockTransport;

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let manager = Arc::new(UnifiedWebSocketManager::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(WebSocketConfig::default(), manager, shutdown_rx);
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_is_decorated_by_mode() {
        let config = WebSocketConfig {
            heartbeat_interval: 1,
            connection_timeout: 600,
            cleanup_interval: 600,
            ..Default::default()
        };
        let manager = Arc::new(UnifiedWebSocketManager::new());
        manager.set_mode(ManagerMode::Emergency);

        let (t, probe) = MockTransport::recording();
        manager
            .add_connection(ConnectionRecord::new("c1", "u1", t))
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(HeartbeatTask::new(config, manager, shutdown_rx).run());

        tokio::time::timeout(Duration::from_secs(3), async {
            while probe.sent_count() == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("Should receive heartbeat");

        let frame = &probe.sent()[0];
        assert_eq!(frame["type"], "heartbeat");
        assert_eq!(frame["emergency_mode"], true);

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }
}
