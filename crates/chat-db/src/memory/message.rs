use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};

use chat_core::entities::Message;
use chat_core::error::DomainError;
use chat_core::traits::{DeliveryUpdate, MessageQuery, MessageStore, RepoResult};
use chat_core::value_objects::{ChatId, MessageId, UserId};

#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: DashMap<MessageId, Message>,
    hidden: DashSet<(MessageId, UserId)>,
    unavailable: AtomicBool,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn check_available(&self) -> RepoResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::StoreUnavailable(
                "message store switched off".to_string(),
            ));
        }
        Ok(())
    }

    fn is_hidden(&self, id: MessageId, user: UserId) -> bool {
        self.hidden.contains(&(id, user))
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create(&self, message: &Message) -> RepoResult<()> {
        self.check_available()?;
        self.messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: MessageId) -> RepoResult<Option<Message>> {
        self.check_available()?;
        Ok(self.messages.get(&id).map(|m| m.value().clone()))
    }

    async fn find_by_chat(
        &self,
        chat_id: ChatId,
        viewer: UserId,
        query: MessageQuery,
    ) -> RepoResult<Vec<Message>> {
        self.check_available()?;
        let mut page: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id && !m.deleted)
            .filter(|m| query.before.map_or(true, |before| m.id < before))
            .filter(|m| !self.is_hidden(m.id, viewer))
            .map(|m| m.value().clone())
            .collect();

        page.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        page.truncate(usize::try_from(query.limit).unwrap_or(0));
        page.reverse();
        Ok(page)
    }

    async fn record_delivered(
        &self,
        message_id: MessageId,
        user: UserId,
        at: DateTime<Utc>,
    ) -> RepoResult<DeliveryUpdate> {
        self.check_available()?;
        let mut message = self
            .messages
            .get_mut(&message_id)
            .ok_or(DomainError::MessageNotFound(message_id))?;

        let newly_delivered = message.delivery.mark_delivered(user, at);
        Ok(DeliveryUpdate {
            chat_id: message.chat_id,
            delivered_at: message.delivery.delivered_at(user).unwrap_or(at),
            newly_delivered,
        })
    }

    async fn record_read(
        &self,
        chat_id: ChatId,
        message_ids: &[MessageId],
        user: UserId,
        at: DateTime<Utc>,
    ) -> RepoResult<Vec<MessageId>> {
        self.check_available()?;
        let mut newly_read = Vec::new();
        for id in message_ids {
            if let Some(mut message) = self.messages.get_mut(id) {
                if message.chat_id == chat_id && message.delivery.mark_read(user, at) {
                    newly_read.push(*id);
                }
            }
        }
        newly_read.sort_unstable();
        newly_read.dedup();
        Ok(newly_read)
    }

    async fn hide_for_user(&self, message_id: MessageId, user: UserId) -> RepoResult<()> {
        self.check_available()?;
        if !self.messages.contains_key(&message_id) {
            return Err(DomainError::MessageNotFound(message_id));
        }
        self.hidden.insert((message_id, user));
        Ok(())
    }

    async fn delete_for_everyone(&self, message_id: MessageId) -> RepoResult<()> {
        self.check_available()?;
        let mut message = self
            .messages
            .get_mut(&message_id)
            .ok_or(DomainError::MessageNotFound(message_id))?;
        message.delete_for_everyone();
        Ok(())
    }

    async fn unread_count(&self, chat_id: ChatId, user: UserId) -> RepoResult<i64> {
        self.check_available()?;
        let count = self
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id && m.is_unread_for(user))
            .filter(|m| !self.is_hidden(m.id, user))
            .count();
        Ok(count as i64)
    }
}
