use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};

use crate::connection_manager::{Connection, ConnectionRegistry, UserId};
use crate::metrics::{DeliveryMetrics, WaitMetrics, MESSAGE_DELIVERY_LATENCY};
use crate::mode::{ManagerMode, ModeController};
use crate::serializer::{self, MessageValue};
use crate::transport::{Frame, TransportError};

use super::{DeliveryConfig, DeliveryReport, DeliveryStats, DeliveryStatsSnapshot};

/// Lower bound on the wait polling interval
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Delivers frames to registered connections
pub struct DeliveryEngine {
    registry: Arc<ConnectionRegistry>,
    mode: Arc<ModeController>,
    config: DeliveryConfig,
    stats: DeliveryStats,
}

impl DeliveryEngine {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        mode: Arc<ModeController>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            registry,
            mode,
            config,
            stats: DeliveryStats::default(),
        }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Get delivery statistics
    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Serialize a message and apply the current mode's decoration.
    ///
    /// Non-object payloads are wrapped as `{"type": "message", "data": ...}`.
    pub fn build_frame(&self, message: &MessageValue) -> (Frame, ManagerMode) {
        let mut object = match serializer::serialize(message) {
            Value::Object(map) => map,
            other => {
                let mut map = Map::with_capacity(2);
                map.insert("type".to_string(), Value::String("message".to_string()));
                map.insert("data".to_string(), other);
                map
            }
        };
        let mode = self.mode.decorate(&mut object);
        (Arc::new(Value::Object(object)), mode)
    }

    /// Send a message to every connection of a user.
    ///
    /// Per-connection failures are logged and counted; they never abort
    /// delivery to the user's other connections and never reach the caller.
    /// A user with no connections is a no-op.
    #[tracing::instrument(
        name = "delivery.send_to_user",
        skip(self, message),
        fields(user_id = %user_id)
    )]
    pub async fn send_to_user(
        &self,
        user_id: &str,
        message: impl Into<MessageValue>,
    ) -> DeliveryReport {
        let start = Instant::now();
        let connections = self.registry.user_connections(user_id);
        self.stats.user_messages.fetch_add(1, Ordering::Relaxed);

        if connections.is_empty() {
            tracing::debug!(user_id = %user_id, "No connections for user, nothing to send");
            self.stats.record_outcome(0, 0);
            return DeliveryReport::empty(self.mode.current());
        }

        let (frame, mode) = self.build_frame(&message.into());
        let (delivered, failed) = self.send_to_connections(&connections, frame).await;

        self.stats.record_outcome(delivered, failed);
        DeliveryMetrics::record_user_sent();
        DeliveryMetrics::record_delivered(delivered as u64);
        MESSAGE_DELIVERY_LATENCY.observe(start.elapsed().as_secs_f64());

        tracing::debug!(
            user_id = %user_id,
            mode = %mode,
            delivered = delivered,
            failed = failed,
            "Sent message to user"
        );

        DeliveryReport::new(delivered, failed, mode)
    }

    /// Send a message to a single connection
    #[tracing::instrument(
        name = "delivery.send_to_connection",
        skip(self, message),
        fields(connection_id = %connection_id)
    )]
    pub async fn send_to_connection(
        &self,
        connection_id: &str,
        message: impl Into<MessageValue>,
    ) -> DeliveryReport {
        self.stats.connection_messages.fetch_add(1, Ordering::Relaxed);

        let Some(connection) = self.registry.get(connection_id) else {
            tracing::debug!(connection_id = %connection_id, "Unknown connection, nothing to send");
            self.stats.record_outcome(0, 0);
            return DeliveryReport::empty(self.mode.current());
        };

        let (frame, mode) = self.build_frame(&message.into());
        let delivered = self.send_one(&connection, frame).await;
        let (delivered, failed) = if delivered { (1, 0) } else { (0, 1) };

        self.stats.record_outcome(delivered, failed);
        DeliveryMetrics::record_connection_sent();
        DeliveryMetrics::record_delivered(delivered as u64);

        DeliveryReport::new(delivered, failed, mode)
    }

    /// Send a message to every live connection
    #[tracing::instrument(name = "delivery.broadcast", skip(self, message))]
    pub async fn broadcast(&self, message: impl Into<MessageValue>) -> DeliveryReport {
        let start = Instant::now();
        let connections = self.registry.all_connections();
        self.stats.broadcast_messages.fetch_add(1, Ordering::Relaxed);

        let (frame, mode) = self.build_frame(&message.into());
        let (delivered, failed) = self.send_to_connections(&connections, frame).await;

        self.stats.record_outcome(delivered, failed);
        DeliveryMetrics::record_broadcast_sent();
        DeliveryMetrics::record_delivered(delivered as u64);
        MESSAGE_DELIVERY_LATENCY.observe(start.elapsed().as_secs_f64());

        tracing::debug!(
            mode = %mode,
            delivered = delivered,
            failed = failed,
            "Broadcast message to all connections"
        );

        DeliveryReport::new(delivered, failed, mode)
    }

    /// Wait until `user_id` has at least one connection or `timeout` elapses.
    ///
    /// Wakes on registration of that user's connections and also re-checks
    /// every `check_interval`. Never errors; returns whether a connection
    /// exists.
    #[tracing::instrument(
        name = "delivery.wait_for_connection",
        skip(self),
        fields(user_id = %user_id, timeout_ms = timeout.as_millis() as u64)
    )]
    pub async fn wait_for_connection(
        &self,
        user_id: &str,
        timeout: Duration,
        check_interval: Duration,
    ) -> bool {
        let Ok(user) = UserId::new(user_id) else {
            return false;
        };

        if self.registry.has_connections(user_id) {
            self.record_wait(true);
            return true;
        }

        let check_interval = check_interval.max(MIN_CHECK_INTERVAL);
        // `None` when the timeout is too large to represent; wait without bound
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        let notify = self.registry.waiter(&user);

        let connected = loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register interest before checking so a concurrent add is not missed
            notified.as_mut().enable();

            if self.registry.has_connections(user_id) {
                break true;
            }

            let nap = match deadline {
                Some(deadline) => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        break false;
                    }
                    check_interval.min(deadline - now)
                }
                None => check_interval,
            };
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(nap) => {}
            }
        };

        self.registry.release_waiter(&user, notify);
        self.record_wait(connected);

        if !connected {
            tracing::debug!(user_id = %user_id, "Timed out waiting for connection");
        }
        connected
    }

    /// Send once the user is connected, waiting up to `wait_timeout`.
    ///
    /// Returns `false` if no connection appeared in time; the message is
    /// dropped in that case.
    pub async fn send_to_user_with_wait(
        &self,
        user_id: &str,
        message: impl Into<MessageValue>,
        wait_timeout: Duration,
    ) -> bool {
        let message = message.into();

        if !self.registry.has_connections(user_id)
            && !self
                .wait_for_connection(user_id, wait_timeout, self.config.check_interval)
                .await
        {
            tracing::warn!(
                user_id = %user_id,
                wait_timeout_ms = wait_timeout.as_millis() as u64,
                "No connection appeared for user, message not sent"
            );
            return false;
        }

        self.send_to_user(user_id, message).await;
        true
    }

    fn record_wait(&self, connected: bool) {
        if connected {
            self.stats.waits_connected.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.waits_timed_out.fetch_add(1, Ordering::Relaxed);
        }
        WaitMetrics::record(connected);
    }

    /// Submit a frame to many connections concurrently.
    ///
    /// Every connection gets its own future, so a slow or hung transport only
    /// holds up its own slot (bounded by `send_timeout`).
    async fn send_to_connections(
        &self,
        connections: &[Arc<Connection>],
        frame: Frame,
    ) -> (usize, usize) {
        if connections.is_empty() {
            return (0, 0);
        }

        let max_concurrent = self.config.max_concurrent_sends.max(1);
        let mut futures = FuturesUnordered::new();
        let mut delivered = 0;
        let mut failed = 0;

        for conn in connections {
            futures.push(self.send_one(conn, frame.clone()));

            // Process completed futures when we hit the concurrency limit
            while futures.len() >= max_concurrent {
                match futures.next().await {
                    Some(true) => delivered += 1,
                    Some(false) => failed += 1,
                    None => break,
                }
            }
        }

        while let Some(ok) = futures.next().await {
            if ok {
                delivered += 1;
            } else {
                failed += 1;
            }
        }

        (delivered, failed)
    }

    /// Submit one frame; failures are logged and recorded here
    async fn send_one(&self, conn: &Arc<Connection>, frame: Frame) -> bool {
        let result = match tokio::time::timeout(self.config.send_timeout, conn.send(frame)).await {
            Ok(result) => result,
            Err(_) => {
                conn.record_failure();
                Err(TransportError::Timeout(self.config.send_timeout))
            }
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    connection_id = %conn.connection_id,
                    user_id = %conn.user_id,
                    error = %e,
                    "Failed to deliver message to connection"
                );
                DeliveryMetrics::record_failure(e.reason());
                false
            }
        }
    }
}
