//! Chat entity <-> model mapper

use chat_core::entities::Chat;
use chat_core::value_objects::{ChatId, MessageId, UserId};

use crate::models::ChatModel;

impl ChatModel {
    pub fn into_chat(self, members: Vec<i64>) -> Chat {
        Chat {
            id: ChatId::new(self.id),
            name: self.name,
            is_group: self.is_group,
            members: members.into_iter().map(UserId::new).collect(),
            admin_id: self.admin_id.map(UserId::new),
            last_message_id: self.last_message_id.map(MessageId::new),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
