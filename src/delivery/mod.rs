//! Event delivery: fan-out to a user's connections, waiting for a user to
//! connect, and the combined wait-then-send.

mod engine;
mod stats;

use std::time::Duration;

use serde::Serialize;

use crate::mode::ManagerMode;

pub use engine::DeliveryEngine;
pub use stats::{DeliveryStats, DeliveryStatsSnapshot};

/// Maximum number of concurrent per-connection sends in one fan-out
pub const DEFAULT_MAX_CONCURRENT_SENDS: usize = 100;

/// Delivery tuning
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Upper bound on a single connection's transport write
    pub send_timeout: Duration,
    /// Polling interval used by `wait_for_connection`
    pub check_interval: Duration,
    /// Longest wait the admin send endpoint honours
    pub wait_timeout: Duration,
    pub max_concurrent_sends: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            check_interval: Duration::from_millis(100),
            wait_timeout: Duration::from_secs(5),
            max_concurrent_sends: DEFAULT_MAX_CONCURRENT_SENDS,
        }
    }
}

/// Outcome of one logical send. Informational only: delivery is best-effort
/// and callers are never required to inspect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Number of connections the frame was submitted to
    pub delivered: usize,
    /// Number of connections whose transport failed or timed out
    pub failed: usize,
    /// Mode whose decoration was applied
    pub mode: ManagerMode,
}

impl DeliveryReport {
    pub(crate) fn new(delivered: usize, failed: usize, mode: ManagerMode) -> Self {
        Self {
            delivered,
            failed,
            mode,
        }
    }

    pub(crate) fn empty(mode: ManagerMode) -> Self {
        Self::new(0, 0, mode)
    }

    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0
    }
}
