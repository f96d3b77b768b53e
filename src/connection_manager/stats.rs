//! Connection statistics and info structures

use serde::Serialize;

/// Connection statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub unique_users: usize,
}

/// Per-connection summary exposed by the admin API
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: String,
    pub connected_at: chrono::DateTime<chrono::Utc>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub metadata: std::collections::BTreeMap<String, serde_json::Value>,
}

/// User connection information
#[derive(Debug, Clone, Serialize)]
pub struct UserConnectionInfo {
    pub user_id: String,
    pub connection_count: usize,
    pub connections: Vec<ConnectionInfo>,
}

impl From<&super::Connection> for ConnectionInfo {
    fn from(conn: &super::Connection) -> Self {
        Self {
            connection_id: conn.connection_id.to_string(),
            connected_at: conn.connected_at,
            last_activity: conn.last_activity(),
            messages_sent: conn.messages_sent(),
            send_failures: conn.send_failures(),
            metadata: conn.metadata.clone(),
        }
    }
}
