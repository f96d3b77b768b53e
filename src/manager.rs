//! `UnifiedWebSocketManager`: the surface external code uses to register
//! connections and deliver events.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::Settings;
use crate::connection_manager::{
    Connection, ConnectionError, ConnectionId, ConnectionLimits, ConnectionRecord,
    ConnectionRegistry, ConnectionStats, UserConnectionInfo, UserConnections,
};
use crate::delivery::{DeliveryConfig, DeliveryEngine, DeliveryReport, DeliveryStatsSnapshot};
use crate::lifecycle::LifecycleManager;
use crate::metrics::ModeMetrics;
use crate::mode::{ManagerMode, ModeController};
use crate::serializer::MessageValue;
use crate::transport::Transport;

/// Combined statistics for the `/stats` endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub mode: ManagerMode,
    pub connections: ConnectionStats,
    pub delivery: DeliveryStatsSnapshot,
}

/// Connection registry, lifecycle and delivery behind one handle
pub struct UnifiedWebSocketManager {
    registry: Arc<ConnectionRegistry>,
    mode: Arc<ModeController>,
    lifecycle: LifecycleManager,
    delivery: DeliveryEngine,
}

impl UnifiedWebSocketManager {
    pub fn new() -> Self {
        Self::with_config(
            ConnectionLimits::default(),
            DeliveryConfig::default(),
            ManagerMode::default(),
        )
    }

    pub fn with_config(
        limits: ConnectionLimits,
        delivery: DeliveryConfig,
        mode: ManagerMode,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::with_limits(limits));
        let mode = Arc::new(ModeController::new(mode));
        ModeMetrics::set(mode.current());

        Self {
            lifecycle: LifecycleManager::with_close_timeout(registry.clone(), delivery.send_timeout),
            delivery: DeliveryEngine::new(registry.clone(), mode.clone(), delivery),
            registry,
            mode,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_config(
            settings.websocket.limits(),
            settings.delivery.delivery_config(),
            settings.delivery.mode,
        )
    }

    // ---- lifecycle ----

    pub fn add_connection(
        &self,
        record: ConnectionRecord,
    ) -> Result<Arc<Connection>, ConnectionError> {
        self.lifecycle.add_connection(record)
    }

    pub fn add_connection_by_user(
        &self,
        user_id: &str,
        transport: Box<dyn Transport>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<Arc<Connection>, ConnectionError> {
        self.lifecycle
            .add_connection_by_user(user_id, transport, metadata)
    }

    pub async fn remove_connection(&self, connection_id: &str) -> bool {
        self.lifecycle.remove_connection(connection_id).await
    }

    pub async fn remove_connection_by_user(&self, user_id: &str) -> usize {
        self.lifecycle.remove_connection_by_user(user_id).await
    }

    pub async fn cleanup_stale_connections(&self, timeout_secs: u64) -> usize {
        self.lifecycle.cleanup_stale_connections(timeout_secs).await
    }

    pub async fn close_all(&self) -> usize {
        self.lifecycle.close_all().await
    }

    // ---- reads ----

    pub fn get_connection(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.registry.get(connection_id)
    }

    /// Connection IDs owned by `user_id`; empty for unknown users
    pub fn get_user_connections(&self, user_id: &str) -> HashSet<ConnectionId> {
        self.registry.user_connection_ids(user_id)
    }

    pub fn user_connections(&self, user_id: &str) -> UserConnections {
        self.registry.user_connections(user_id)
    }

    pub fn all_connections(&self) -> Vec<Arc<Connection>> {
        self.registry.all_connections()
    }

    pub fn user_info(&self, user_id: &str) -> Option<UserConnectionInfo> {
        self.registry.user_info(user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            mode: self.mode.current(),
            connections: self.registry.stats(),
            delivery: self.delivery.stats(),
        }
    }

    // ---- delivery ----

    pub async fn send_to_user(
        &self,
        user_id: &str,
        message: impl Into<MessageValue>,
    ) -> DeliveryReport {
        self.delivery.send_to_user(user_id, message).await
    }

    pub async fn send_to_connection(
        &self,
        connection_id: &str,
        message: impl Into<MessageValue>,
    ) -> DeliveryReport {
        self.delivery.send_to_connection(connection_id, message).await
    }

    pub async fn broadcast(&self, message: impl Into<MessageValue>) -> DeliveryReport {
        self.delivery.broadcast(message).await
    }

    pub async fn wait_for_connection(
        &self,
        user_id: &str,
        timeout: Duration,
        check_interval: Duration,
    ) -> bool {
        self.delivery
            .wait_for_connection(user_id, timeout, check_interval)
            .await
    }

    pub async fn send_to_user_with_wait(
        &self,
        user_id: &str,
        message: impl Into<MessageValue>,
        wait_timeout: Duration,
    ) -> bool {
        self.delivery
            .send_to_user_with_wait(user_id, message, wait_timeout)
            .await
    }

    pub fn delivery_config(&self) -> &DeliveryConfig {
        self.delivery.config()
    }

    // ---- mode ----

    pub fn mode(&self) -> ManagerMode {
        self.mode.current()
    }

    /// Switch the operating mode; takes effect for the next send
    pub fn set_mode(&self, mode: ManagerMode) -> ManagerMode {
        let previous = self.mode.set_mode(mode);
        ModeMetrics::set(mode);
        previous
    }
}

impl Default for UnifiedWebSocketManager {
    fn default() -> Self {
        Self::new()
    }
}
