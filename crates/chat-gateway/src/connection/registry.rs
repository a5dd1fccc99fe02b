//! Connection registry
//!
//! UserId -> open connections. Owned by the engine task, so plain maps.

use std::collections::{HashMap, HashSet};

use chat_core::UserId;

use super::{Connection, ConnectionId, SendStatus};
use crate::events::EncodedEvent;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. No per-user limit.
    pub fn register(&mut self, connection: Connection) {
        let id = connection.id();
        self.by_user
            .entry(connection.user_id())
            .or_default()
            .insert(id);
        self.connections.insert(id, connection);
        tracing::debug!(connection_id = %id, "Connection registered");
    }

    /// Remove a connection and hand it back. `None` for an unknown id, so a
    /// second cleanup of the same connection does nothing.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        let user_id = connection.user_id();
        if let Some(ids) = self.by_user.get_mut(&user_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_user.remove(&user_id);
            }
        }
        tracing::debug!(connection_id = %id, user_id = %user_id, "Connection unregistered");
        Some(connection)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.by_user.contains_key(&user_id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Users with at least one connection, in id order
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.by_user.keys().copied().collect();
        users.sort_unstable();
        users
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Dispatch to one connection. Unknown ids are ignored.
    pub fn send_to(&mut self, id: ConnectionId, event: &EncodedEvent) -> SendStatus {
        self.connections
            .get_mut(&id)
            .map_or(SendStatus::Queued, |connection| connection.dispatch(event))
    }

    /// Dispatch to every connection not owned by `except_user`. Returns the
    /// connections that could not keep up.
    pub fn broadcast_all(&mut self, event: &EncodedEvent, except_user: UserId) -> Vec<ConnectionId> {
        self.connections
            .values_mut()
            .filter(|connection| connection.user_id() != except_user)
            .filter_map(|connection| {
                (connection.dispatch(event) == SendStatus::Lagging).then(|| connection.id())
            })
            .collect()
    }
}
