//! Prometheus metrics for the connection manager.
//!
//! - Connection metrics (active connections, unique users, churn)
//! - Delivery metrics (sent by target, delivered, failed by reason)
//! - Wait metrics (connected vs. timed out)
//! - Operating mode
//! - Heartbeat round duration

mod helpers;

pub use helpers::{
    encode_metrics, ConnectionMetrics, DeliveryMetrics, HeartbeatMetrics, ModeMetrics, WaitMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "uwm";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Total number of active connections
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Total number of active connections"
    ).unwrap();

    /// Number of unique connected users
    pub static ref USERS_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_users_connected", METRIC_PREFIX),
        "Number of unique connected users"
    ).unwrap();

    /// Connections registered
    pub static ref CONNECTIONS_REGISTERED: IntCounter = register_int_counter!(
        format!("{}_connections_registered_total", METRIC_PREFIX),
        "Total connections registered"
    ).unwrap();

    /// Connections removed (and closed)
    pub static ref CONNECTIONS_REMOVED: IntCounter = register_int_counter!(
        format!("{}_connections_removed_total", METRIC_PREFIX),
        "Total connections removed from the registry"
    ).unwrap();

    /// Registrations rejected by validation or limits
    pub static ref CONNECTIONS_REJECTED: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_rejected_total", METRIC_PREFIX),
        "Total connection registrations rejected",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Total messages sent by target type
    pub static ref MESSAGES_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_sent_total", METRIC_PREFIX),
        "Total messages sent",
        &["target"]
    ).unwrap();

    /// Total messages delivered (connection count)
    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Total messages successfully submitted to connections"
    ).unwrap();

    /// Per-connection delivery failures by reason
    pub static ref MESSAGES_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_failed_total", METRIC_PREFIX),
        "Total per-connection delivery failures",
        &["reason"]
    ).unwrap();

    /// Fan-out latency (serialize + submit to every connection)
    pub static ref MESSAGE_DELIVERY_LATENCY: Histogram = register_histogram!(
        format!("{}_message_delivery_latency_seconds", METRIC_PREFIX),
        "Message delivery latency in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    ).unwrap();

    // ============================================================================
    // Wait Metrics
    // ============================================================================

    /// Outcomes of wait_for_connection
    pub static ref WAIT_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_wait_outcomes_total", METRIC_PREFIX),
        "Outcomes of waiting for a user connection",
        &["outcome"]
    ).unwrap();

    // ============================================================================
    // Mode Metrics
    // ============================================================================

    /// Current operating mode (0=unified, 1=isolated, 2=emergency, 3=degraded)
    pub static ref MANAGER_MODE: IntGauge = register_int_gauge!(
        format!("{}_manager_mode", METRIC_PREFIX),
        "Current operating mode (0=unified, 1=isolated, 2=emergency, 3=degraded)"
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    /// Heartbeat round duration in milliseconds
    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Heartbeat round duration in milliseconds",
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    ).unwrap();

    /// Stale connections removed by the cleanup task
    pub static ref STALE_CONNECTIONS_REMOVED: IntCounter = register_int_counter!(
        format!("{}_stale_connections_removed_total", METRIC_PREFIX),
        "Total stale connections removed"
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics() {
        CONNECTIONS_TOTAL.set(1);

        let result = encode_metrics();
        assert!(result.is_ok());
        let output = result.unwrap();
        assert!(output.contains("uwm_connections_total"));
    }

    #[test]
    fn test_delivery_metrics() {
        DeliveryMetrics::record_user_sent();
        DeliveryMetrics::record_delivered(3);
        DeliveryMetrics::record_failure("timeout");
        MESSAGE_DELIVERY_LATENCY.observe(0.002);
        // Just verify no panics
    }

    #[test]
    fn test_wait_and_mode_metrics() {
        WaitMetrics::record(true);
        WaitMetrics::record(false);
        ModeMetrics::set(crate::mode::ManagerMode::Degraded);
        // Just verify no panics
    }
}
