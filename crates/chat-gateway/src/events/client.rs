//! Inbound events (op 3)

use chat_core::{ChatId, MessageId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Most ids a single mark-read may carry, same as a history page
pub const MAX_READ_BATCH: usize = 100;

/// Everything a connected client may ask of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { chat_id: ChatId },

    #[serde(rename_all = "camelCase")]
    LeaveRoom { chat_id: ChatId },

    #[serde(rename_all = "camelCase")]
    TypingStart {
        chat_id: ChatId,
        #[serde(default)]
        user_display_name: String,
    },

    #[serde(rename_all = "camelCase")]
    TypingStop { chat_id: ChatId },

    #[serde(rename_all = "camelCase")]
    MarkDelivered { message_id: MessageId },

    #[serde(rename_all = "camelCase")]
    MarkRead {
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
    },
}

impl ClientEvent {
    /// Build from the `t` and `d` fields of an op 3 envelope.
    pub fn from_parts(name: &str, data: Option<Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "t": name,
            "d": data.unwrap_or(Value::Null),
        }))
    }

    /// Bounds serde cannot express.
    pub fn check_limits(&self) -> Result<(), String> {
        match self {
            Self::MarkRead { message_ids, .. } if message_ids.len() > MAX_READ_BATCH => Err(format!(
                "mark-read carries {} ids, at most {MAX_READ_BATCH} allowed",
                message_ids.len()
            )),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::LeaveRoom { .. } => "leave-room",
            Self::TypingStart { .. } => "typing-start",
            Self::TypingStop { .. } => "typing-stop",
            Self::MarkDelivered { .. } => "mark-delivered",
            Self::MarkRead { .. } => "mark-read",
        }
    }
}
