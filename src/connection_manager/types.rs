//! Connection identity, handle and related types

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::transport::{Frame, Transport, TransportError};

/// Opaque identifier of exactly one live transport instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Result<Self, ConnectionError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ConnectionError::EmptyConnectionId);
        }
        Ok(Self(id))
    }

    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Tenant / end-user identifier. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self, ConnectionError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ConnectionError::EmptyUserId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for UserId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Caller-supplied description of a connection to register.
///
/// Registering a record hands the transport over to the registry.
pub struct ConnectionRecord {
    pub connection_id: String,
    pub user_id: String,
    pub transport: Box<dyn Transport>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ConnectionRecord {
    pub fn new(
        connection_id: impl Into<String>,
        user_id: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            user_id: user_id.into(),
            transport,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("connection_id", &self.connection_id)
            .field("user_id", &self.user_id)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// A registered connection. Owned by the registry.
pub struct Connection {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    transport: Box<dyn Transport>,
    /// Last activity timestamp (Unix seconds) - using AtomicI64 for lock-free updates
    last_activity: AtomicI64,
    messages_sent: AtomicU64,
    send_failures: AtomicU64,
    closed: AtomicBool,
}

impl Connection {
    /// Validate a record and turn it into a connection
    pub fn from_record(record: ConnectionRecord) -> Result<Self, ConnectionError> {
        let user_id = UserId::new(record.user_id)?;
        let connection_id = ConnectionId::new(record.connection_id)?;
        Ok(Self::new(connection_id, user_id, record.transport, record.metadata))
    }

    pub fn new(
        connection_id: ConnectionId,
        user_id: UserId,
        transport: Box<dyn Transport>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            connection_id,
            user_id,
            connected_at: now,
            metadata,
            transport,
            last_activity: AtomicI64::new(now.timestamp()),
            messages_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Record client activity
    pub fn touch(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Submit a frame on this connection's transport.
    ///
    /// Failures are counted on the connection; they never remove it.
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            self.send_failures.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::Closed);
        }

        match self.transport.send_json(frame).await {
            Ok(()) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Record a failure that happened outside the transport (e.g. timeout)
    pub(crate) fn record_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Close the transport. Only the first call reaches the transport;
    /// returns whether this call performed the close.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        if let Err(e) = self.transport.close().await {
            tracing::warn!(
                connection_id = %self.connection_id,
                user_id = %self.user_id,
                error = %e,
                "Transport close failed"
            );
        }
        true
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connection_id", &self.connection_id)
            .field("user_id", &self.user_id)
            .field("connected_at", &self.connected_at)
            .field("metadata", &self.metadata)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Validation errors for registry mutations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("user_id must not be empty")]
    EmptyUserId,

    #[error("connection_id must not be empty")]
    EmptyConnectionId,

    #[error("connection {0} is already registered")]
    DuplicateConnection(String),

    #[error("Total connection limit exceeded ({current}/{max})")]
    TotalLimitExceeded { current: usize, max: usize },

    #[error("User {user_id} connection limit exceeded ({current}/{max})")]
    UserLimitExceeded {
        user_id: String,
        current: usize,
        max: usize,
    },
}

impl ConnectionError {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::EmptyUserId | Self::EmptyConnectionId => "invalid",
            Self::DuplicateConnection(_) => "duplicate",
            Self::TotalLimitExceeded { .. } => "total_limit",
            Self::UserLimitExceeded { .. } => "user_limit",
        }
    }
}

/// Limits for connection management
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_connections: usize,
    pub max_connections_per_user: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_connections: 10000,
            max_connections_per_user: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingTransport {
        sends: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send_json(&self, _frame: Frame) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Send("socket reset".into()));
            }
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_empty_ids_rejected() {
        assert_eq!(UserId::new(""), Err(ConnectionError::EmptyUserId));
        assert_eq!(UserId::new("   "), Err(ConnectionError::EmptyUserId));
        assert_eq!(ConnectionId::new(""), Err(ConnectionError::EmptyConnectionId));
        assert!(UserId::new("user-1").is_ok());
    }

    #[test]
    fn test_from_record_validates_user_first() {
        let record = ConnectionRecord::new("", "", Box::new(CountingTransport::default()));
        assert_eq!(
            Connection::from_record(record).unwrap_err(),
            ConnectionError::EmptyUserId
        );

        let record = ConnectionRecord::new("", "u1", Box::new(CountingTransport::default()));
        assert_eq!(
            Connection::from_record(record).unwrap_err(),
            ConnectionError::EmptyConnectionId
        );
    }

    #[test]
    fn test_record_metadata() {
        let record = ConnectionRecord::new("c1", "u1", Box::new(CountingTransport::default()))
            .with_metadata("device", json!("mobile"));
        let conn = Connection::from_record(record).unwrap();
        assert_eq!(conn.metadata.get("device"), Some(&json!("mobile")));
        assert_eq!(conn.connection_id.as_str(), "c1");
    }

    #[tokio::test]
    async fn test_send_counts_success_and_failure() {
        let ok = Connection::new(
            ConnectionId::generate(),
            UserId::new("u1").unwrap(),
            Box::new(CountingTransport::default()),
            BTreeMap::new(),
        );
        ok.send(Arc::new(json!({"type": "ping"}))).await.unwrap();
        assert_eq!(ok.messages_sent(), 1);
        assert_eq!(ok.send_failures(), 0);

        let failing = Connection::new(
            ConnectionId::generate(),
            UserId::new("u1").unwrap(),
            Box::new(CountingTransport {
                fail: true,
                ..Default::default()
            }),
            BTreeMap::new(),
        );
        assert!(failing.send(Arc::new(json!({"type": "ping"}))).await.is_err());
        assert_eq!(failing.send_failures(), 1);
        assert!(!failing.is_closed());
    }

    #[tokio::test]
    async fn test_close_reaches_transport_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let conn = Arc::new(Connection::new(
            ConnectionId::generate(),
            UserId::new("u1").unwrap(),
            Box::new(CountingTransport {
                closes: closes.clone(),
                ..Default::default()
            }),
            BTreeMap::new(),
        ));

        let (a, b) = tokio::join!(conn.close(), conn.close());
        assert!(a ^ b);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let result = conn.send(Arc::new(json!({"type": "late"}))).await;
        assert_eq!(result, Err(TransportError::Closed));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(ConnectionId::generate(), ConnectionId::generate());
    }
}
