//! Collaborator traits (ports)
//!
//! The domain says what it needs from persistence and authentication; the
//! infrastructure crates provide the implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{Chat, Message, User};
use crate::error::DomainError;
use crate::value_objects::{ChatId, MessageId, UserId};

pub type RepoResult<T> = Result<T, DomainError>;

// ============================================================================
// Message Store
// ============================================================================

/// Page request for a chat's history: the newest `limit` messages strictly
/// older than `before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageQuery {
    pub before: Option<MessageId>,
    pub limit: i64,
}

impl MessageQuery {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(before: Option<MessageId>, limit: Option<i64>) -> Self {
        Self {
            before,
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Outcome of recording a delivery receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryUpdate {
    /// Chat the message belongs to, for routing the broadcast
    pub chat_id: ChatId,
    /// The stored (first) delivery time
    pub delivered_at: DateTime<Utc>,
    /// `false` when the user was already in the delivered set
    pub newly_delivered: bool,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, message: &Message) -> RepoResult<()>;

    async fn find_by_id(&self, id: MessageId) -> RepoResult<Option<Message>>;

    /// Page of `chat_id` visible to `viewer`, oldest first. Messages deleted
    /// for everyone or hidden by the viewer are left out.
    async fn find_by_chat(
        &self,
        chat_id: ChatId,
        viewer: UserId,
        query: MessageQuery,
    ) -> RepoResult<Vec<Message>>;

    /// Add `user` to the delivered set of `message_id`. Never overwrites an
    /// existing entry. Fails with `MessageNotFound` for an unknown message.
    async fn record_delivered(
        &self,
        message_id: MessageId,
        user: UserId,
        at: DateTime<Utc>,
    ) -> RepoResult<DeliveryUpdate>;

    /// Add `user` to the read set (and the delivered set where missing) of
    /// every id that belongs to `chat_id`. Returns the ids whose read set
    /// actually grew; unknown ids are skipped.
    async fn record_read(
        &self,
        chat_id: ChatId,
        message_ids: &[MessageId],
        user: UserId,
        at: DateTime<Utc>,
    ) -> RepoResult<Vec<MessageId>>;

    /// Tombstone: hide `message_id` from `user` only.
    async fn hide_for_user(&self, message_id: MessageId, user: UserId) -> RepoResult<()>;

    /// Replace the content with a placeholder for every participant.
    async fn delete_for_everyone(&self, message_id: MessageId) -> RepoResult<()>;

    /// Messages in `chat_id` sent by others that `user` has not read and
    /// has not hidden
    async fn unread_count(&self, chat_id: ChatId, user: UserId) -> RepoResult<i64>;
}

// ============================================================================
// Chat Directory
// ============================================================================

#[async_trait]
pub trait ChatDirectory: Send + Sync {
    async fn find_by_id(&self, id: ChatId) -> RepoResult<Option<Chat>>;

    /// Always fetched, never cached by callers
    async fn is_member(&self, chat_id: ChatId, user_id: UserId) -> RepoResult<bool>;

    async fn create(&self, chat: &Chat) -> RepoResult<()>;

    async fn touch_last_message(&self, chat_id: ChatId, message_id: MessageId) -> RepoResult<()>;
}

// ============================================================================
// User Repository
// ============================================================================

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> RepoResult<Option<User>>;

    async fn exists(&self, id: UserId) -> RepoResult<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }

    async fn create(&self, user: &User) -> RepoResult<()>;

    /// Persist a presence flip. Going offline stamps `last_seen_at`.
    async fn record_presence(&self, id: UserId, online: bool, at: DateTime<Utc>) -> RepoResult<()>;
}

// ============================================================================
// Authentication
// ============================================================================

/// Exchanges an opaque credential for the user it was issued to.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Fails with [`DomainError::Unauthenticated`] for any invalid credential.
    async fn verify_credential(&self, token: &str) -> RepoResult<UserId>;
}
