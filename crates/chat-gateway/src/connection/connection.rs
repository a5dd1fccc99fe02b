//! A single authenticated real-time connection
//!
//! Owned by the [`ConnectionRegistry`](super::ConnectionRegistry); everything
//! else refers to it by [`ConnectionId`].

use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use chat_core::{ChatId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::events::EncodedEvent;
use crate::protocol::{CloseCode, GatewayMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Outcome of queueing one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Queued,
    /// Queue full or socket task gone; the connection must be evicted.
    Lagging,
}

pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    sender: mpsc::Sender<GatewayMessage>,
    kick: Option<oneshot::Sender<CloseCode>>,
    rooms: HashSet<ChatId>,
    /// Last sequence number sent
    sequence: u64,
    connected_at: Instant,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        user_id: UserId,
        sender: mpsc::Sender<GatewayMessage>,
        kick: oneshot::Sender<CloseCode>,
    ) -> Self {
        Self {
            id,
            user_id,
            sender,
            kick: Some(kick),
            rooms: HashSet::new(),
            sequence: 0,
            connected_at: Instant::now(),
        }
    }

    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[inline]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    // === Rooms ===

    /// Returns `false` if already joined
    pub fn join_room(&mut self, chat_id: ChatId) -> bool {
        self.rooms.insert(chat_id)
    }

    pub fn leave_room(&mut self, chat_id: ChatId) -> bool {
        self.rooms.remove(&chat_id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = ChatId> + '_ {
        self.rooms.iter().copied()
    }

    // === Outbound ===

    /// Queue a dispatch without waiting. Never blocks the caller.
    pub fn dispatch(&mut self, event: &EncodedEvent) -> SendStatus {
        self.sequence += 1;
        let message = GatewayMessage::dispatch(event.name, self.sequence, event.data.clone());
        match self.sender.try_send(message) {
            Ok(()) => SendStatus::Queued,
            Err(_) => SendStatus::Lagging,
        }
    }

    /// Ask the socket task to close with `code`. Only the first call has an effect.
    pub fn kick(&mut self, code: CloseCode) {
        if let Some(kick) = self.kick.take() {
            // The socket task may already be gone.
            let _ = kick.send(code);
        }
    }

    /// Time since the connection was registered
    pub fn age(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("rooms", &self.rooms.len())
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::connection;
    use super::*;
    use crate::events::ServerEvent;

    #[test]
    fn test_dispatch_numbers_sequentially() {
        let (mut conn, mut socket) = connection(UserId::new(1), 8);
        let event = ServerEvent::error("X", "y", None).encode();

        assert_eq!(conn.dispatch(&event), SendStatus::Queued);
        assert_eq!(conn.dispatch(&event), SendStatus::Queued);

        let first = socket.outbound.try_recv().unwrap();
        let second = socket.outbound.try_recv().unwrap();
        assert_eq!(first.s, Some(1));
        assert_eq!(second.s, Some(2));
        assert_eq!(second.t.as_deref(), Some("error"));
    }

    #[test]
    fn test_full_queue_reports_lagging() {
        let (mut conn, _socket) = connection(UserId::new(1), 1);
        let event = ServerEvent::error("X", "y", None).encode();

        assert_eq!(conn.dispatch(&event), SendStatus::Queued);
        assert_eq!(conn.dispatch(&event), SendStatus::Lagging);
    }

    #[test]
    fn test_closed_socket_reports_lagging() {
        let (mut conn, socket) = connection(UserId::new(1), 4);
        drop(socket);
        let event = ServerEvent::error("X", "y", None).encode();
        assert_eq!(conn.dispatch(&event), SendStatus::Lagging);
    }

    #[test]
    fn test_kick_fires_once() {
        let (mut conn, mut socket) = connection(UserId::new(1), 4);
        conn.kick(CloseCode::ConsumerLagging);
        conn.kick(CloseCode::UnknownError);
        assert_eq!(socket.kicked.try_recv().unwrap(), CloseCode::ConsumerLagging);
    }

    #[test]
    fn test_rooms() {
        let (mut conn, _socket) = connection(UserId::new(1), 4);
        assert!(conn.join_room(ChatId::new(5)));
        assert!(!conn.join_room(ChatId::new(5)));
        assert_eq!(conn.rooms().collect::<Vec<_>>(), vec![ChatId::new(5)]);
        assert!(conn.leave_room(ChatId::new(5)));
        assert!(!conn.leave_room(ChatId::new(5)));
    }
}
