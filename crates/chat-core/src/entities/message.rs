//! Message entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::delivery::DeliveryRecord;
use crate::value_objects::{ChatId, MessageId, UserId};

/// Content shown in place of a message deleted for everyone
pub const DELETED_PLACEHOLDER: &str = "This message was deleted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    Audio,
    Video,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Every kind except text carries an uploaded file
    #[inline]
    pub fn expects_file(self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// Reference to an already-uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub url: String,
    pub name: String,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    pub file: Option<FileAttachment>,
    pub reply_to: Option<MessageId>,
    /// Deleted for every participant
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub delivery: DeliveryRecord,
}

impl Message {
    pub fn new(id: MessageId, chat_id: ChatId, sender_id: UserId, content: String) -> Self {
        let created_at = Utc::now();
        Self {
            id,
            chat_id,
            sender_id,
            content,
            kind: MessageKind::Text,
            file: None,
            reply_to: None,
            deleted: false,
            created_at,
            delivery: DeliveryRecord::for_sender(sender_id, created_at),
        }
    }

    pub fn with_file(mut self, kind: MessageKind, file: FileAttachment) -> Self {
        self.kind = kind;
        self.file = Some(file);
        self
    }

    pub fn replying_to(mut self, message_id: MessageId) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    #[inline]
    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.file.is_none()
    }

    /// Unread for `user`: someone else sent it and `user` has no read entry.
    pub fn is_unread_for(&self, user: UserId) -> bool {
        !self.deleted && self.sender_id != user && !self.delivery.is_read_by(user)
    }

    /// Replace the body with the placeholder. Receipts are kept.
    pub fn delete_for_everyone(&mut self) {
        self.deleted = true;
        self.content = DELETED_PLACEHOLDER.to_string();
        self.file = None;
    }
}
