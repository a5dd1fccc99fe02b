//! The real-time core
//!
//! Owns the registry, rooms, presence, typing and delivery state. Every
//! method is synchronous; anything that must touch the store comes back
//! as [`Effects`] for the engine loop to run.

use std::collections::HashMap;
use std::time::Duration;

use chat_core::{ChatId, DomainError, MessageId, UserId};
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::delivery::{
    DeliveryEffect, DeliveryStateMachine, WriteCompletion, WriteJob, WriteOutcome,
};
use super::presence::{PresenceSnapshot, PresenceTracker};
use super::rooms::RoomMembership;
use super::typing::{TypingCoordinator, TypingEnded, TypingTransition};
use crate::connection::{Connection, ConnectionId, ConnectionRegistry, SendStatus};
use crate::events::{ClientEvent, ServerEvent};
use crate::protocol::CloseCode;

/// Wall clock for payloads, monotonic clock for deadlines
#[derive(Debug, Clone, Copy)]
pub struct Now {
    pub wall: DateTime<Utc>,
    pub instant: Instant,
}

impl Now {
    #[must_use]
    pub fn current() -> Self {
        Self {
            wall: Utc::now(),
            instant: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceChange {
    pub user_id: UserId,
    pub online: bool,
    pub at: DateTime<Utc>,
}

/// Work the core cannot do itself
/// Answer to a read recorded on behalf of a REST request: the ids whose
/// read set grew
pub type ReadReply = oneshot::Sender<Result<Vec<MessageId>, DomainError>>;

#[derive(Debug, Default)]
pub struct Effects {
    /// Receipt writes to start now
    pub writes: Vec<WriteJob>,
    /// Presence flips to persist
    pub presence: Vec<PresenceChange>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.presence.is_empty()
    }
}

#[derive(Debug)]
pub struct RealtimeCore {
    registry: ConnectionRegistry,
    rooms: RoomMembership,
    presence: PresenceTracker,
    typing: TypingCoordinator,
    delivery: DeliveryStateMachine,
    /// Requesters waiting on a read job, by job id
    read_replies: HashMap<u64, ReadReply>,
    /// Connections whose outbound queue overflowed, pending eviction
    lagging: Vec<ConnectionId>,
}

impl RealtimeCore {
    #[must_use]
    pub fn new(typing_timeout: Duration) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: RoomMembership::new(),
            presence: PresenceTracker::new(),
            typing: TypingCoordinator::new(typing_timeout),
            delivery: DeliveryStateMachine::new(),
            read_replies: HashMap::new(),
            lagging: Vec::new(),
        }
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    pub fn connect(&mut self, connection: Connection, now: Now) -> Effects {
        let mut effects = Effects::default();
        let id = connection.id();
        let user_id = connection.user_id();
        self.registry.register(connection);
        tracing::info!(connection_id = %id, user_id = %user_id, "Connection ready");

        let ready = ServerEvent::Ready {
            user_id,
            connection_id: id,
            online_users: self.registry.online_users(),
        };
        self.send_to(id, &ready);
        self.announce_presence(user_id, now, &mut effects);
        self.drain_lagging(now, &mut effects);
        effects
    }

    /// Safe to call more than once for the same connection.
    pub fn disconnect(&mut self, id: ConnectionId, now: Now) -> Effects {
        let mut effects = Effects::default();
        if let Some(connection) = self.teardown(id, now, &mut effects) {
            tracing::info!(
                connection_id = %id,
                connected_secs = connection.age().as_secs(),
                "Connection closed"
            );
        }
        self.drain_lagging(now, &mut effects);
        effects
    }

    fn teardown(&mut self, id: ConnectionId, now: Now, effects: &mut Effects) -> Option<Connection> {
        let connection = self.registry.unregister(id)?;
        let user_id = connection.user_id();
        self.rooms.remove_connection(id, connection.rooms());

        for ended in self.typing.stop_all_from(id) {
            self.announce_typing_stop(ended);
        }
        self.announce_presence(user_id, now, effects);
        Some(connection)
    }

    fn drain_lagging(&mut self, now: Now, effects: &mut Effects) {
        while let Some(id) = self.lagging.pop() {
            if let Some(mut connection) = self.teardown(id, now, effects) {
                tracing::warn!(
                    connection_id = %id,
                    user_id = %connection.user_id(),
                    "Evicting lagging connection"
                );
                connection.kick(CloseCode::ConsumerLagging);
            }
        }
    }

    // =========================================================================
    // Inbound events
    // =========================================================================

    /// Apply one inbound event. Membership for join-room has already been
    /// checked by the connection task.
    pub fn handle_event(&mut self, id: ConnectionId, event: ClientEvent, now: Now) -> Effects {
        let mut effects = Effects::default();
        let Some(connection) = self.registry.get_mut(id) else {
            tracing::debug!(connection_id = %id, event = event.name(), "Event for unknown connection");
            return effects;
        };
        let user_id = connection.user_id();

        match event {
            ClientEvent::JoinRoom { chat_id } => {
                connection.join_room(chat_id);
                self.rooms.join(id, chat_id);
                tracing::debug!(connection_id = %id, chat_id = %chat_id, "Joined room");
            }
            ClientEvent::LeaveRoom { chat_id } => {
                connection.leave_room(chat_id);
                self.rooms.leave(id, chat_id);
                if let Some(ended) = self.typing.stop_from(chat_id, user_id, id) {
                    self.announce_typing_stop(ended);
                }
            }
            ClientEvent::TypingStart {
                chat_id,
                user_display_name,
            } => {
                if self.rooms.is_member(id, chat_id) {
                    let transition = self.typing.start(chat_id, user_id, id, now.instant);
                    if transition == TypingTransition::Started {
                        let event = ServerEvent::TypingStart {
                            chat_id,
                            user_id,
                            user_display_name,
                        };
                        self.broadcast(chat_id, &event, Some(id));
                    }
                } else {
                    let error = ServerEvent::error(
                        "NOT_IN_ROOM",
                        format!("join chat {chat_id} before typing in it"),
                        Some("typing-start"),
                    );
                    self.send_to(id, &error);
                }
            }
            ClientEvent::TypingStop { chat_id } => {
                // The stopper may be another device than the one that started.
                if let Some(ended) = self.typing.stop(chat_id, user_id) {
                    self.announce_typing_stop(TypingEnded { origin: id, ..ended });
                }
            }
            ClientEvent::MarkDelivered { message_id } => {
                effects.writes.extend(
                    self.delivery
                        .mark_delivered(id, user_id, message_id, now.wall),
                );
            }
            ClientEvent::MarkRead {
                chat_id,
                message_ids,
            } => {
                effects.writes.extend(
                    self.delivery
                        .mark_read(id, user_id, chat_id, message_ids, now.wall),
                );
            }
        }

        self.drain_lagging(now, &mut effects);
        effects
    }

    /// End every typing signal whose deadline has passed.
    pub fn expire_typing(&mut self, now: Now) -> Effects {
        let mut effects = Effects::default();
        for ended in self.typing.expire(now.instant) {
            self.announce_typing_stop(ended);
        }
        self.drain_lagging(now, &mut effects);
        effects
    }

    pub fn next_typing_deadline(&mut self) -> Option<Instant> {
        self.typing.next_deadline()
    }

    /// A receipt write finished; broadcast or report, then start whatever it unblocked.
    pub fn complete_write(&mut self, completion: WriteCompletion, now: Now) -> Effects {
        let mut effects = Effects::default();
        let reply = self.read_replies.remove(&completion.job.id);
        if let Some(reply) = reply {
            let answer = match &completion.result {
                Ok(WriteOutcome::Read(newly_read)) => Ok(newly_read.clone()),
                Ok(WriteOutcome::Delivered(_)) => Ok(Vec::new()),
                Err(e) => Err(e.clone()),
            };
            // The request may have been dropped meanwhile.
            let _ = reply.send(answer);
        }

        let (effect, next) = self.delivery.complete(completion);
        match effect {
            DeliveryEffect::Broadcast {
                chat_id,
                event,
                exclude,
            } => self.broadcast(chat_id, &event, exclude),
            DeliveryEffect::ReportError { connection, event } => self.send_to(connection, &event),
            DeliveryEffect::Nothing => {}
        }
        effects.writes = next;
        self.drain_lagging(now, &mut effects);
        effects
    }

    // =========================================================================
    // Outbound from the REST side
    // =========================================================================

    /// Record reads on behalf of a REST request. The write queues behind any
    /// receipt already pending for the same messages; `reply` is answered once
    /// it has committed and been announced.
    pub fn mark_read_for_request(
        &mut self,
        user_id: UserId,
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
        read_at: DateTime<Utc>,
        reply: ReadReply,
    ) -> Effects {
        let mut effects = Effects::default();
        match self
            .delivery
            .read_job(None, user_id, chat_id, message_ids, read_at)
        {
            Some(job) => {
                self.read_replies.insert(job.id, reply);
                effects.writes.extend(self.delivery.submit(job));
            }
            None => {
                let _ = reply.send(Ok(Vec::new()));
            }
        }
        effects
    }

    pub fn publish(
        &mut self,
        chat_id: ChatId,
        event: &ServerEvent,
        exclude: Option<ConnectionId>,
        now: Now,
    ) -> Effects {
        let mut effects = Effects::default();
        self.broadcast(chat_id, event, exclude);
        self.drain_lagging(now, &mut effects);
        effects
    }

    pub fn send(&mut self, id: ConnectionId, event: &ServerEvent, now: Now) -> Effects {
        let mut effects = Effects::default();
        self.send_to(id, event);
        self.drain_lagging(now, &mut effects);
        effects
    }

    pub fn presence_of(&self, user_id: UserId) -> PresenceSnapshot {
        let announced = self.presence.snapshot(user_id);
        PresenceSnapshot {
            online: self.registry.is_online(user_id),
            ..announced
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomMembership {
        &self.rooms
    }

    pub fn typing(&self) -> &TypingCoordinator {
        &self.typing
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn send_to(&mut self, id: ConnectionId, event: &ServerEvent) {
        if self.registry.send_to(id, &event.encode()) == SendStatus::Lagging {
            self.lagging.push(id);
        }
    }

    fn broadcast(&mut self, chat_id: ChatId, event: &ServerEvent, exclude: Option<ConnectionId>) {
        let lagging = self
            .rooms
            .broadcast(chat_id, &event.encode(), exclude, &mut self.registry);
        self.lagging.extend(lagging);
    }

    fn announce_typing_stop(&mut self, ended: TypingEnded) {
        let event = ServerEvent::TypingStop {
            chat_id: ended.chat_id,
            user_id: ended.user_id,
        };
        self.broadcast(ended.chat_id, &event, Some(ended.origin));
    }

    fn announce_presence(&mut self, user_id: UserId, now: Now, effects: &mut Effects) {
        let Some(event) = self
            .presence
            .on_connection_change(user_id, &self.registry, now.wall)
        else {
            return;
        };
        if let ServerEvent::PresenceChanged { online, .. } = event {
            effects.presence.push(PresenceChange {
                user_id,
                online,
                at: now.wall,
            });
        }
        let lagging = self.registry.broadcast_all(&event.encode(), user_id);
        self.lagging.extend(lagging);
    }
}
