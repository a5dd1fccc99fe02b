//! Chat entity - a one-to-one or group conversation

use chrono::{DateTime, Utc};

use crate::value_objects::{ChatId, MessageId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub name: Option<String>,
    pub is_group: bool,
    pub members: Vec<UserId>,
    pub admin_id: Option<UserId>,
    pub last_message_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// One-to-one conversation between two users
    pub fn direct(id: ChatId, a: UserId, b: UserId) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: None,
            is_group: false,
            members: vec![a, b],
            admin_id: None,
            last_message_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Group conversation; the admin is always a member.
    pub fn group(id: ChatId, name: String, admin: UserId, members: Vec<UserId>) -> Self {
        let now = Utc::now();
        let mut all = Vec::with_capacity(members.len() + 1);
        all.push(admin);
        for member in members {
            if !all.contains(&member) {
                all.push(member);
            }
        }
        Self {
            id,
            name: Some(name),
            is_group: true,
            members: all,
            admin_id: Some(admin),
            last_message_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn has_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    #[inline]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn set_last_message(&mut self, message_id: MessageId) {
        self.last_message_id = Some(message_id);
        self.updated_at = Utc::now();
    }
}
