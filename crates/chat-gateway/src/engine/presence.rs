//! Presence tracker
//!
//! Online means "has at least one registered connection". The tracker only
//! remembers what it last announced, so it can tell a flip from a repeat.

use std::collections::HashMap;

use chat_core::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::connection::ConnectionRegistry;
use crate::events::ServerEvent;

/// Last announced presence of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub online: bool,
    /// When the user went offline; `None` while online or never seen
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct PresenceTracker {
    announced: HashMap<UserId, PresenceSnapshot>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read the registry for `user_id`. Returns the event to broadcast iff
    /// the online flag flipped since the last announcement.
    pub fn on_connection_change(
        &mut self,
        user_id: UserId,
        registry: &ConnectionRegistry,
        now: DateTime<Utc>,
    ) -> Option<ServerEvent> {
        let online = registry.is_online(user_id);
        let was_online = self.announced.get(&user_id).is_some_and(|p| p.online);
        if online == was_online {
            return None;
        }

        let last_seen_at = (!online).then_some(now);
        self.announced.insert(
            user_id,
            PresenceSnapshot {
                online,
                last_seen_at,
            },
        );
        tracing::debug!(user_id = %user_id, online, "Presence changed");

        Some(ServerEvent::PresenceChanged {
            user_id,
            online,
            last_seen_at,
        })
    }

    /// Unknown users read as offline and never seen.
    pub fn snapshot(&self, user_id: UserId) -> PresenceSnapshot {
        self.announced
            .get(&user_id)
            .copied()
            .unwrap_or(PresenceSnapshot {
                online: false,
                last_seen_at: None,
            })
    }
}
