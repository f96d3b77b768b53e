use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Statistics for the delivery engine
#[derive(Debug, Default)]
pub struct DeliveryStats {
    /// Logical sends issued (any target)
    pub total_sent: AtomicU64,
    /// Successful per-connection submissions
    pub total_delivered: AtomicU64,
    /// Failed per-connection submissions
    pub total_failed: AtomicU64,
    pub user_messages: AtomicU64,
    pub connection_messages: AtomicU64,
    pub broadcast_messages: AtomicU64,
    pub waits_connected: AtomicU64,
    pub waits_timed_out: AtomicU64,
}

impl DeliveryStats {
    pub(crate) fn record_outcome(&self, delivered: usize, failed: usize) {
        self.total_sent.fetch_add(1, Ordering::Relaxed);
        self.total_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.total_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            user_messages: self.user_messages.load(Ordering::Relaxed),
            connection_messages: self.connection_messages.load(Ordering::Relaxed),
            broadcast_messages: self.broadcast_messages.load(Ordering::Relaxed),
            waits_connected: self.waits_connected.load(Ordering::Relaxed),
            waits_timed_out: self.waits_timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of delivery statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryStatsSnapshot {
    pub total_sent: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub user_messages: u64,
    pub connection_messages: u64,
    pub broadcast_messages: u64,
    pub waits_connected: u64,
    pub waits_timed_out: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_snapshot() {
        let stats = DeliveryStats::default();
        stats.record_outcome(3, 1);
        stats.record_outcome(2, 0);
        stats.user_messages.fetch_add(2, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_sent, 2);
        assert_eq!(snapshot.total_delivered, 5);
        assert_eq!(snapshot.total_failed, 1);
        assert_eq!(snapshot.user_messages, 2);
    }
}
