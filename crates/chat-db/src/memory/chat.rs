use async_trait::async_trait;
use dashmap::DashMap;

use chat_core::entities::Chat;
use chat_core::error::DomainError;
use chat_core::traits::{ChatDirectory, RepoResult};
use chat_core::value_objects::{ChatId, MessageId, UserId};

#[derive(Debug, Default)]
pub struct MemoryChatDirectory {
    chats: DashMap<ChatId, Chat>,
}

impl MemoryChatDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatDirectory for MemoryChatDirectory {
    async fn find_by_id(&self, id: ChatId) -> RepoResult<Option<Chat>> {
        Ok(self.chats.get(&id).map(|c| c.value().clone()))
    }

    async fn is_member(&self, chat_id: ChatId, user_id: UserId) -> RepoResult<bool> {
        Ok(self
            .chats
            .get(&chat_id)
            .is_some_and(|chat| chat.has_member(user_id)))
    }

    async fn create(&self, chat: &Chat) -> RepoResult<()> {
        self.chats.insert(chat.id, chat.clone());
        Ok(())
    }

    async fn touch_last_message(&self, chat_id: ChatId, message_id: MessageId) -> RepoResult<()> {
        let mut chat = self
            .chats
            .get_mut(&chat_id)
            .ok_or(DomainError::ChatNotFound(chat_id))?;
        chat.set_last_message(message_id);
        Ok(())
    }
}
