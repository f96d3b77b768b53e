//! Connection lifecycle: ownership transfer on add, exactly-once close on
//! removal, and the bulk paths used by cleanup and shutdown.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::connection_manager::{
    Connection, ConnectionError, ConnectionId, ConnectionRecord, ConnectionRegistry, UserId,
};
use crate::metrics::ConnectionMetrics;
use crate::transport::Transport;

/// Upper bound on one transport close when none is configured
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Adds and removes connections on behalf of the registry's callers
pub struct LifecycleManager {
    registry: Arc<ConnectionRegistry>,
    close_timeout: Duration,
}

impl LifecycleManager {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self::with_close_timeout(registry, DEFAULT_CLOSE_TIMEOUT)
    }

    pub fn with_close_timeout(registry: Arc<ConnectionRegistry>, close_timeout: Duration) -> Self {
        Self {
            registry,
            close_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Register a caller-built record. The record's transport now belongs
    /// to the registry; on error it is dropped without being closed.
    pub fn add_connection(
        &self,
        record: ConnectionRecord,
    ) -> Result<Arc<Connection>, ConnectionError> {
        let result = Connection::from_record(record).and_then(|conn| self.registry.insert(conn));
        self.observe_add(result)
    }

    /// Register a transport for `user_id` under a freshly generated ID
    pub fn add_connection_by_user(
        &self,
        user_id: &str,
        transport: Box<dyn Transport>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<Arc<Connection>, ConnectionError> {
        let result = UserId::new(user_id).and_then(|user_id| {
            let conn = Connection::new(ConnectionId::generate(), user_id, transport, metadata);
            self.registry.insert(conn)
        });
        self.observe_add(result)
    }

    fn observe_add(
        &self,
        result: Result<Arc<Connection>, ConnectionError>,
    ) -> Result<Arc<Connection>, ConnectionError> {
        match &result {
            Ok(_) => ConnectionMetrics::record_registered(),
            Err(e) => {
                tracing::warn!(error = %e, "Connection rejected");
                ConnectionMetrics::record_rejected(e.reason());
            }
        }
        ConnectionMetrics::update(&self.registry.stats());
        result
    }

    /// Remove and close one connection. Returns `false` for unknown IDs or
    /// when a concurrent call already removed it.
    pub async fn remove_connection(&self, connection_id: &str) -> bool {
        let Some(conn) = self.registry.remove(connection_id) else {
            return false;
        };

        self.close_connection(&conn).await;
        ConnectionMetrics::record_removed(1);
        ConnectionMetrics::update(&self.registry.stats());
        true
    }

    /// Remove and close every connection owned by `user_id`
    pub async fn remove_connection_by_user(&self, user_id: &str) -> usize {
        let removed = self.registry.remove_user(user_id);
        self.close_removed(removed).await
    }

    /// Remove connections idle for longer than `timeout_secs`
    pub async fn cleanup_stale_connections(&self, timeout_secs: u64) -> usize {
        let stale = self.registry.find_stale_connections(timeout_secs);
        if stale.is_empty() {
            return 0;
        }

        let removed: Vec<_> = stale
            .iter()
            .filter_map(|id| self.registry.remove(id.as_str()))
            .collect();

        for conn in &removed {
            tracing::info!(
                connection_id = %conn.connection_id,
                user_id = %conn.user_id,
                last_activity = %conn.last_activity(),
                "Removing stale connection"
            );
        }

        let count = self.close_removed(removed).await;
        ConnectionMetrics::record_stale_removed(count as u64);
        count
    }

    /// Remove and close every registered connection
    pub async fn close_all(&self) -> usize {
        let removed: Vec<_> = self
            .registry
            .all_connections()
            .iter()
            .filter_map(|conn| self.registry.remove(conn.connection_id.as_str()))
            .collect();

        let count = self.close_removed(removed).await;
        if count > 0 {
            tracing::info!(closed = count, "Closed all connections");
        }
        count
    }

    async fn close_removed(&self, removed: Vec<Arc<Connection>>) -> usize {
        let count = removed.len();
        if count == 0 {
            return 0;
        }

        join_all(removed.iter().map(|conn| self.close_connection(conn))).await;
        ConnectionMetrics::record_removed(count as u64);
        ConnectionMetrics::update(&self.registry.stats());
        count
    }

    /// Close a removed connection, giving up after `close_timeout`.
    ///
    /// The connection is already out of the registry and marked closed, so
    /// an abandoned close only leaves the transport to be dropped.
    async fn close_connection(&self, conn: &Connection) {
        if tokio::time::timeout(self.close_timeout, conn.close())
            .await
            .is_err()
        {
            tracing::warn!(
                connection_id = %conn.connection_id,
                user_id = %conn.user_id,
                timeout_ms = self.close_timeout.as_millis() as u64,
                "Transport close timed out"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::ConnectionLimits;
    use crate::test_support::MockTransport;
    use tokio_test::{assert_err, assert_ok};

    fn lifecycle() -> LifecycleManager {
        LifecycleManager::new(Arc::new(ConnectionRegistry::new()))
    }

    #[tokio::test]
    async fn test_add_and_remove_closes_once() {
        let lifecycle = lifecycle();
        let (t, probe) = MockTransport::recording();
        assert_ok!(lifecycle.add_connection(ConnectionRecord::new("c1", "u1", t)));

        assert!(lifecycle.remove_connection("c1").await);
        assert!(!lifecycle.remove_connection("c1").await);
        assert_eq!(probe.closes(), 1);
        assert!(probe.is_dropped());
        assert!(lifecycle.registry().get("c1").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_removal_closes_once() {
        let lifecycle = Arc::new(lifecycle());
        let (t, probe) = MockTransport::recording();
        assert_ok!(lifecycle.add_connection(ConnectionRecord::new("c1", "u1", t)));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let lifecycle = lifecycle.clone();
                tokio::spawn(async move { lifecycle.remove_connection("c1").await })
            })
            .collect();

        let mut removed = 0;
        for task in tasks {
            if task.await.unwrap() {
                removed += 1;
            }
        }
        assert_eq!(removed, 1);
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test]
    async fn test_add_rejects_empty_ids() {
        let lifecycle = lifecycle();
        let (t, probe) = MockTransport::recording();
        let err = assert_err!(lifecycle.add_connection(ConnectionRecord::new("c1", "", t)));
        assert_eq!(err, ConnectionError::EmptyUserId);
        assert!(probe.is_dropped());
        assert_eq!(probe.closes(), 0);

        let (t, _) = MockTransport::recording();
        let err = assert_err!(lifecycle.add_connection(ConnectionRecord::new("", "u1", t)));
        assert_eq!(err, ConnectionError::EmptyConnectionId);

        let (t, _) = MockTransport::recording();
        let err = assert_err!(lifecycle.add_connection_by_user("", t, BTreeMap::new()));
        assert_eq!(err, ConnectionError::EmptyUserId);
        assert_eq!(lifecycle.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_add_by_user_generates_unique_ids() {
        let lifecycle = lifecycle();
        let (a, _) = MockTransport::recording();
        let (b, _) = MockTransport::recording();

        let first = assert_ok!(lifecycle.add_connection_by_user("u1", a, BTreeMap::new()));
        let second = assert_ok!(lifecycle.add_connection_by_user("u1", b, BTreeMap::new()));

        assert_ne!(first.connection_id, second.connection_id);
        assert_eq!(lifecycle.registry().user_connection_ids("u1").len(), 2);
    }

    #[tokio::test]
    async fn test_remove_by_user_is_idempotent() {
        let lifecycle = lifecycle();
        let (a, a_probe) = MockTransport::recording();
        let (b, b_probe) = MockTransport::recording();
        let (other, other_probe) = MockTransport::recording();
        assert_ok!(lifecycle.add_connection(ConnectionRecord::new("mobile", "u1", a)));
        assert_ok!(lifecycle.add_connection(ConnectionRecord::new("web", "u1", b)));
        assert_ok!(lifecycle.add_connection(ConnectionRecord::new("c3", "u2", other)));

        assert_eq!(lifecycle.remove_connection_by_user("u1").await, 2);
        assert_eq!(lifecycle.remove_connection_by_user("u1").await, 0);
        assert_eq!(lifecycle.remove_connection_by_user("nobody").await, 0);

        assert_eq!(a_probe.closes(), 1);
        assert_eq!(b_probe.closes(), 1);
        assert_eq!(other_probe.closes(), 0);
        assert_eq!(lifecycle.registry().user_connection_ids("u2").len(), 1);
    }

    #[tokio::test]
    async fn test_close_failure_still_removes() {
        let lifecycle = lifecycle();
        let (t, probe) = MockTransport::failing();
        assert_ok!(lifecycle.add_connection(ConnectionRecord::new("c1", "u1", t)));

        assert!(lifecycle.remove_connection("c1").await);
        assert_eq!(probe.closes(), 1);
        assert!(!lifecycle.registry().has_connections("u1"));
    }

    #[tokio::test]
    async fn test_stuck_close_is_bounded() {
        let lifecycle = LifecycleManager::with_close_timeout(
            Arc::new(ConnectionRegistry::new()),
            Duration::from_millis(100),
        );
        let (stuck, stuck_probe) = MockTransport::stuck_on_close();
        let (other, other_probe) = MockTransport::recording();
        assert_ok!(lifecycle.add_connection(ConnectionRecord::new("c1", "u1", stuck)));
        assert_ok!(lifecycle.add_connection(ConnectionRecord::new("c2", "u1", other)));

        let removed = tokio::time::timeout(
            Duration::from_secs(2),
            lifecycle.remove_connection("c1"),
        )
        .await
        .expect("removal should not wait on a stuck close");
        assert!(removed);
        assert_eq!(stuck_probe.closes(), 1);
        assert!(stuck_probe.is_dropped());
        assert!(lifecycle.registry().get("c1").is_none());

        let (stuck, _) = MockTransport::stuck_on_close();
        assert_ok!(lifecycle.add_connection(ConnectionRecord::new("c3", "u2", stuck)));
        let closed = tokio::time::timeout(Duration::from_secs(2), lifecycle.close_all())
            .await
            .expect("close_all should not wait on a stuck close");
        assert_eq!(closed, 2);
        assert_eq!(other_probe.closes(), 1);
        assert_eq!(lifecycle.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_stale_connections() {
        let lifecycle = lifecycle();
        let (t, probe) = MockTransport::recording();
        assert_ok!(lifecycle.add_connection(ConnectionRecord::new("c1", "u1", t)));

        // Nothing is older than an hour
        assert_eq!(lifecycle.cleanup_stale_connections(3600).await, 0);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(lifecycle.cleanup_stale_connections(0).await, 1);
        assert_eq!(probe.closes(), 1);
        assert_eq!(lifecycle.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_close_all() {
        let lifecycle = LifecycleManager::new(Arc::new(ConnectionRegistry::with_limits(
            ConnectionLimits {
                max_connections: 50,
                max_connections_per_user: 5,
            },
        )));

        let mut probes = Vec::new();
        for i in 0..10 {
            let (t, probe) = MockTransport::recording();
            assert_ok!(lifecycle.add_connection(ConnectionRecord::new(
                format!("c{}", i),
                format!("u{}", i % 3),
                t
            )));
            probes.push(probe);
        }

        assert_eq!(lifecycle.close_all().await, 10);
        assert_eq!(lifecycle.close_all().await, 0);
        assert!(probes.iter().all(|p| p.closes() == 1 && p.is_dropped()));
        assert_eq!(lifecycle.registry().user_count(), 0);
    }
}
