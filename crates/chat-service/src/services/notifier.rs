//! Seam between the REST services and the real-time engine
//!
//! The gateway implements [`RealtimeNotifier`] on its engine handle; services
//! call it after a write has been persisted.

use async_trait::async_trait;
use chat_core::{ChatId, DomainError, MessageId, UserId};
use chrono::{DateTime, Utc};

use crate::dto::MessageResponse;

#[async_trait]
pub trait RealtimeNotifier: Send + Sync {
    /// Forward a stored message to every connection in its chat room.
    async fn message_created(&self, message: &MessageResponse);

    /// `reader` read `message_ids` through a non-realtime path.
    ///
    /// The engine records the receipts in turn with the ones arriving over
    /// connections and announces the ids whose read set grew. `None` means
    /// nothing sequences receipt writes and the caller records them itself.
    async fn mark_read(
        &self,
        chat_id: ChatId,
        reader: UserId,
        message_ids: Vec<MessageId>,
        read_at: DateTime<Utc>,
    ) -> Option<Result<Vec<MessageId>, DomainError>>;

    async fn message_deleted(&self, chat_id: ChatId, message_id: MessageId);

    /// Whether `user_id` holds at least one live connection
    async fn is_online(&self, user_id: UserId) -> bool;
}

/// Notifier for contexts without a running engine
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl RealtimeNotifier for NoopNotifier {
    async fn message_created(&self, _message: &MessageResponse) {}

    async fn mark_read(
        &self,
        _chat_id: ChatId,
        _reader: UserId,
        _message_ids: Vec<MessageId>,
        _read_at: DateTime<Utc>,
    ) -> Option<Result<Vec<MessageId>, DomainError>> {
        None
    }

    async fn message_deleted(&self, _chat_id: ChatId, _message_id: MessageId) {}

    async fn is_online(&self, _user_id: UserId) -> bool {
        false
    }
}
