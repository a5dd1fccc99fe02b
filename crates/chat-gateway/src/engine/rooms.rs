//! Room membership: which connections listen to which chat

use std::collections::{HashMap, HashSet};

use chat_core::ChatId;

use crate::connection::{ConnectionId, ConnectionRegistry, SendStatus};
use crate::events::EncodedEvent;

#[derive(Debug, Default)]
pub struct RoomMembership {
    rooms: HashMap<ChatId, HashSet<ConnectionId>>,
}

impl RoomMembership {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// No authorization here; callers check membership first.
    pub fn join(&mut self, connection: ConnectionId, chat_id: ChatId) -> bool {
        self.rooms.entry(chat_id).or_default().insert(connection)
    }

    /// No-op if `connection` is not in the room.
    pub fn leave(&mut self, connection: ConnectionId, chat_id: ChatId) -> bool {
        let Some(members) = self.rooms.get_mut(&chat_id) else {
            return false;
        };
        let removed = members.remove(&connection);
        if members.is_empty() {
            self.rooms.remove(&chat_id);
        }
        removed
    }

    /// Drop `connection` from every room in `chats`.
    pub fn remove_connection(
        &mut self,
        connection: ConnectionId,
        chats: impl IntoIterator<Item = ChatId>,
    ) {
        for chat_id in chats {
            self.leave(connection, chat_id);
        }
    }

    pub fn is_member(&self, connection: ConnectionId, chat_id: ChatId) -> bool {
        self.rooms
            .get(&chat_id)
            .is_some_and(|members| members.contains(&connection))
    }

    pub fn members(&self, chat_id: ChatId) -> impl Iterator<Item = ConnectionId> + '_ {
        self.rooms
            .get(&chat_id)
            .into_iter()
            .flat_map(|members| members.iter().copied())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Dispatch `event` to everyone in `chat_id` except `exclude`. Returns
    /// the connections that could not keep up.
    pub fn broadcast(
        &self,
        chat_id: ChatId,
        event: &EncodedEvent,
        exclude: Option<ConnectionId>,
        registry: &mut ConnectionRegistry,
    ) -> Vec<ConnectionId> {
        self.members(chat_id)
            .filter(|id| Some(*id) != exclude)
            .filter(|id| registry.send_to(*id, event) == SendStatus::Lagging)
            .collect()
    }
}
