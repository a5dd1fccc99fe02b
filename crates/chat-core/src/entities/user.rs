//! User entity - the parts of an account this service reads

use chrono::{DateTime, Utc};

use crate::value_objects::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<String>,
    /// Last persisted presence flag. The live value comes from the gateway.
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, name: String) -> Self {
        Self {
            id,
            name,
            avatar: None,
            is_online: false,
            last_seen_at: None,
            created_at: Utc::now(),
        }
    }

    /// Going offline stamps `last_seen_at`; coming online leaves it alone.
    pub fn set_presence(&mut self, online: bool, at: DateTime<Utc>) {
        self.is_online = online;
        if !online {
            self.last_seen_at = Some(at);
        }
    }
}
