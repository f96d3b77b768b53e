//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::connection_manager::ConnectionStats;
use crate::mode::ManagerMode;

use super::{
    CONNECTIONS_REGISTERED, CONNECTIONS_REJECTED, CONNECTIONS_REMOVED, CONNECTIONS_TOTAL,
    HEARTBEAT_DURATION_MS, MANAGER_MODE, MESSAGES_DELIVERED_TOTAL, MESSAGES_FAILED_TOTAL,
    MESSAGES_SENT_TOTAL, STALE_CONNECTIONS_REMOVED, USERS_CONNECTED, WAIT_OUTCOMES_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_registered() {
        CONNECTIONS_REGISTERED.inc();
    }

    pub fn record_removed(count: u64) {
        CONNECTIONS_REMOVED.inc_by(count);
    }

    pub fn record_rejected(reason: &str) {
        CONNECTIONS_REJECTED.with_label_values(&[reason]).inc();
    }

    pub fn record_stale_removed(count: u64) {
        STALE_CONNECTIONS_REMOVED.inc_by(count);
    }

    /// Refresh gauges from a registry snapshot
    pub fn update(stats: &ConnectionStats) {
        CONNECTIONS_TOTAL.set(stats.total_connections as i64);
        USERS_CONNECTED.set(stats.unique_users as i64);
    }
}

/// Helper struct for recording delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record a message sent to a user
    pub fn record_user_sent() {
        MESSAGES_SENT_TOTAL.with_label_values(&["user"]).inc();
    }

    /// Record a message sent to a single connection
    pub fn record_connection_sent() {
        MESSAGES_SENT_TOTAL.with_label_values(&["connection"]).inc();
    }

    /// Record a broadcast message
    pub fn record_broadcast_sent() {
        MESSAGES_SENT_TOTAL.with_label_values(&["broadcast"]).inc();
    }

    /// Record successful deliveries
    pub fn record_delivered(count: u64) {
        MESSAGES_DELIVERED_TOTAL.inc_by(count);
    }

    /// Record one failed delivery
    pub fn record_failure(reason: &str) {
        MESSAGES_FAILED_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for recording wait outcomes
pub struct WaitMetrics;

impl WaitMetrics {
    pub fn record(connected: bool) {
        let outcome = if connected { "connected" } else { "timeout" };
        WAIT_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
    }
}

/// Helper struct for the operating mode gauge
pub struct ModeMetrics;

impl ModeMetrics {
    pub fn set(mode: ManagerMode) {
        let value = match mode {
            ManagerMode::Unified => 0,
            ManagerMode::Isolated => 1,
            ManagerMode::Emergency => 2,
            ManagerMode::Degraded => 3,
        };
        MANAGER_MODE.set(value);
    }
}

/// Helper struct for recording heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_duration_ms(duration_ms: u64) {
        HEARTBEAT_DURATION_MS.observe(duration_ms as f64);
    }
}
