//! Outbound events (op 0 dispatches)

use chat_core::{ChatId, MessageId, UserId};
use chat_service::dto::MessageResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::ConnectionId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    PresenceChanged {
        user_id: UserId,
        online: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen_at: Option<DateTime<Utc>>,
    },

    #[serde(rename_all = "camelCase")]
    TypingStart {
        chat_id: ChatId,
        user_id: UserId,
        user_display_name: String,
    },

    #[serde(rename_all = "camelCase")]
    TypingStop { chat_id: ChatId, user_id: UserId },

    #[serde(rename_all = "camelCase")]
    MessageDelivered {
        message_id: MessageId,
        chat_id: ChatId,
        user_id: UserId,
        delivered_at: DateTime<Utc>,
    },

    #[serde(rename_all = "camelCase")]
    MessagesRead {
        chat_id: ChatId,
        user_id: UserId,
        message_ids: Vec<MessageId>,
        read_at: DateTime<Utc>,
    },

    NewMessage(MessageResponse),

    #[serde(rename_all = "camelCase")]
    MessageDeleted {
        chat_id: ChatId,
        message_id: MessageId,
    },

    /// First dispatch on every connection
    #[serde(rename_all = "camelCase")]
    Ready {
        user_id: UserId,
        connection_id: ConnectionId,
        online_users: Vec<UserId>,
    },

    /// Soft failure of one inbound event; the connection stays open.
    #[serde(rename_all = "camelCase")]
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_ids: Option<Vec<MessageId>>,
    },
}

/// Event rendered once for fan-out to many connections
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedEvent {
    pub name: &'static str,
    pub data: Value,
}

impl ServerEvent {
    pub fn error(code: &str, message: impl Into<String>, event: Option<&str>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
            event: event.map(str::to_string),
            message_ids: None,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PresenceChanged { .. } => "presence-changed",
            Self::TypingStart { .. } => "typing-start",
            Self::TypingStop { .. } => "typing-stop",
            Self::MessageDelivered { .. } => "message-delivered",
            Self::MessagesRead { .. } => "messages-read",
            Self::NewMessage(_) => "new-message",
            Self::MessageDeleted { .. } => "message-deleted",
            Self::Ready { .. } => "ready",
            Self::Error { .. } => "error",
        }
    }

    /// Chat the event is scoped to, if any
    #[must_use]
    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            Self::TypingStart { chat_id, .. }
            | Self::TypingStop { chat_id, .. }
            | Self::MessageDelivered { chat_id, .. }
            | Self::MessagesRead { chat_id, .. }
            | Self::MessageDeleted { chat_id, .. } => Some(*chat_id),
            Self::NewMessage(message) => Some(message.chat_id),
            Self::PresenceChanged { .. } | Self::Ready { .. } | Self::Error { .. } => None,
        }
    }

    #[must_use]
    pub fn encode(&self) -> EncodedEvent {
        let data = match serde_json::to_value(self) {
            Ok(Value::Object(mut fields)) => fields.remove("d").unwrap_or_default(),
            _ => Value::Null,
        };
        EncodedEvent {
            name: self.name(),
            data,
        }
    }

    /// Inverse of [`encode`](Self::encode), for clients reading dispatches
    pub fn from_parts(name: &str, data: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({ "t": name, "d": data }))
    }
}
