//! Connection registry implementation

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use smallvec::SmallVec;
use tokio::sync::Notify;

use super::stats::{ConnectionInfo, ConnectionStats, UserConnectionInfo};
use super::types::{Connection, ConnectionError, ConnectionId, ConnectionLimits, UserId};

/// Snapshot of one user's connection handles. Most users have a handful
/// of devices, so this stays on the stack.
pub type UserConnections = SmallVec<[Arc<Connection>; 4]>;

/// Source of truth for live connections.
///
/// Both maps are sharded by key hash, so operations on different users
/// contend only when their keys share a shard. Lock order is always
/// `user_index` before `connections`; nothing holds a `connections` guard
/// while touching `user_index`.
pub struct ConnectionRegistry {
    /// connection_id -> Connection
    connections: DashMap<ConnectionId, Arc<Connection>>,
    /// user_id -> Set<connection_id> (supports multiple devices)
    user_index: DashMap<UserId, HashSet<ConnectionId>>,
    /// user_id -> wakeup for tasks waiting on that user's first connection
    waiters: DashMap<UserId, Arc<Notify>>,
    total_count: AtomicUsize,
    limits: ConnectionLimits,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_limits(ConnectionLimits::default())
    }

    pub fn with_limits(limits: ConnectionLimits) -> Self {
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
            waiters: DashMap::new(),
            total_count: AtomicUsize::new(0),
            limits,
        }
    }

    pub fn limits(&self) -> ConnectionLimits {
        self.limits
    }

    /// Insert a validated connection into both maps.
    ///
    /// The per-user index entry stays locked until the primary map is
    /// updated, so readers of that user never see one map without the other.
    pub fn insert(&self, connection: Connection) -> Result<Arc<Connection>, ConnectionError> {
        self.reserve_slot()?;

        let user_id = connection.user_id.clone();
        let connection_id = connection.connection_id.clone();

        let result = match self.user_index.entry(user_id.clone()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get().len();
                if current >= self.limits.max_connections_per_user {
                    Err(ConnectionError::UserLimitExceeded {
                        user_id: user_id.to_string(),
                        current,
                        max: self.limits.max_connections_per_user,
                    })
                } else {
                    self.insert_primary(connection).map(|conn| {
                        entry.get_mut().insert(connection_id.clone());
                        conn
                    })
                }
            }
            Entry::Vacant(entry) => {
                if self.limits.max_connections_per_user == 0 {
                    Err(ConnectionError::UserLimitExceeded {
                        user_id: user_id.to_string(),
                        current: 0,
                        max: 0,
                    })
                } else {
                    self.insert_primary(connection).map(|conn| {
                        let mut ids = HashSet::with_capacity(1);
                        ids.insert(connection_id.clone());
                        entry.insert(ids);
                        conn
                    })
                }
            }
        };

        match result {
            Ok(conn) => {
                if let Some(notify) = self.waiters.get(&user_id) {
                    notify.notify_waiters();
                }
                tracing::info!(
                    connection_id = %connection_id,
                    user_id = %user_id,
                    "Connection registered"
                );
                Ok(conn)
            }
            Err(e) => {
                self.total_count.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    fn reserve_slot(&self) -> Result<(), ConnectionError> {
        let max = self.limits.max_connections;
        self.total_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .map(|_| ())
            .map_err(|current| ConnectionError::TotalLimitExceeded { current, max })
    }

    fn insert_primary(&self, connection: Connection) -> Result<Arc<Connection>, ConnectionError> {
        match self.connections.entry(connection.connection_id.clone()) {
            Entry::Occupied(entry) => Err(ConnectionError::DuplicateConnection(
                entry.key().to_string(),
            )),
            Entry::Vacant(entry) => {
                let conn = Arc::new(connection);
                entry.insert(conn.clone());
                Ok(conn)
            }
        }
    }

    /// Remove a connection from both maps. Unknown IDs are a no-op.
    ///
    /// Under concurrent duplicate removal exactly one caller receives the
    /// connection.
    pub fn remove(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let user_id = self.connections.get(connection_id)?.user_id.clone();
        self.remove_owned_by(connection_id, user_id)
    }

    /// Remove `connection_id` only while it still belongs to `user_id`.
    ///
    /// The ID may have been removed and registered again under another user
    /// since the owner was read; that newer entry is left alone.
    pub(crate) fn remove_owned_by(
        &self,
        connection_id: &str,
        user_id: UserId,
    ) -> Option<Arc<Connection>> {
        let removed = match self.user_index.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let removed = self
                    .connections
                    .remove_if(connection_id, |_, conn| &conn.user_id == entry.key())
                    .map(|(_, conn)| conn);
                if removed.is_some() {
                    entry.get_mut().remove(connection_id);
                    if entry.get().is_empty() {
                        entry.remove();
                    }
                }
                removed
            }
            // Raced with remove_user for the same user
            Entry::Vacant(_) => None,
        }?;

        self.total_count.fetch_sub(1, Ordering::AcqRel);
        tracing::info!(
            connection_id = %removed.connection_id,
            user_id = %removed.user_id,
            "Connection unregistered"
        );
        Some(removed)
    }

    /// Remove every connection owned by `user_id`. Unknown users are a no-op.
    pub fn remove_user(&self, user_id: &str) -> Vec<Arc<Connection>> {
        let Ok(user_id) = UserId::new(user_id) else {
            return Vec::new();
        };

        let removed: Vec<Arc<Connection>> = match self.user_index.entry(user_id.clone()) {
            Entry::Occupied(entry) => {
                let removed = entry
                    .get()
                    .iter()
                    .filter_map(|id| {
                        self.connections
                            .remove_if(id, |_, conn| &conn.user_id == entry.key())
                            .map(|(_, conn)| conn)
                    })
                    .collect();
                entry.remove();
                removed
            }
            Entry::Vacant(_) => Vec::new(),
        };

        if !removed.is_empty() {
            self.total_count.fetch_sub(removed.len(), Ordering::AcqRel);
            tracing::info!(
                user_id = %user_id,
                removed = removed.len(),
                "User connections unregistered"
            );
        }
        removed
    }

    /// Get connection by ID
    pub fn get(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.get(connection_id).map(|c| c.clone())
    }

    /// IDs of every connection owned by `user_id`; empty for unknown users
    pub fn user_connection_ids(&self, user_id: &str) -> HashSet<ConnectionId> {
        self.user_index
            .get(user_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// Handles for every connection owned by `user_id`
    pub fn user_connections(&self, user_id: &str) -> UserConnections {
        self.user_index
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.connections.get(id).map(|c| c.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_connections(&self, user_id: &str) -> bool {
        self.user_index.contains_key(user_id)
    }

    /// Get all connections
    pub fn all_connections(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.total_count.load(Ordering::Acquire)
    }

    pub fn user_count(&self) -> usize {
        self.user_index.len()
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            total_connections: self.connection_count(),
            unique_users: self.user_count(),
        }
    }

    /// Summary of one user's connections, `None` when the user is offline
    pub fn user_info(&self, user_id: &str) -> Option<UserConnectionInfo> {
        let connections = self.user_connections(user_id);
        if connections.is_empty() {
            return None;
        }

        let mut infos: Vec<ConnectionInfo> = connections
            .iter()
            .map(|conn| ConnectionInfo::from(conn.as_ref()))
            .collect();
        infos.sort_by(|a, b| a.connected_at.cmp(&b.connected_at));

        Some(UserConnectionInfo {
            user_id: user_id.to_string(),
            connection_count: infos.len(),
            connections: infos,
        })
    }

    /// IDs of connections with no activity for longer than `timeout_secs`
    pub fn find_stale_connections(&self, timeout_secs: u64) -> Vec<ConnectionId> {
        let now = chrono::Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Wakeup handle for tasks waiting on `user_id`'s first connection
    pub(crate) fn waiter(&self, user_id: &UserId) -> Arc<Notify> {
        self.waiters
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Drop a waiter handle, removing the map entry once nobody holds it
    pub(crate) fn release_waiter(&self, user_id: &UserId, notify: Arc<Notify>) {
        drop(notify);
        self.waiters
            .remove_if(user_id, |_, notify| Arc::strong_count(notify) == 1);
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
