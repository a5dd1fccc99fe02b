//! Request DTOs
//!
//! Bodies implement `Deserialize` and `Validate`.

use chat_core::{MessageId, MessageKind};
use serde::Deserialize;
use validator::Validate;

pub const MAX_CONTENT_LENGTH: u64 = 4000;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    #[serde(default)]
    #[validate(length(max = 4000, message = "Content must be at most 4000 characters"))]
    pub content: String,

    #[serde(default)]
    pub kind: MessageKind,

    #[validate(nested)]
    pub file: Option<FileRequest>,

    pub reply_to: Option<MessageId>,
}

/// An already-uploaded file
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FileRequest {
    #[validate(length(min = 1, max = 2048, message = "File url must be 1-2048 characters"))]
    pub url: String,

    #[validate(length(min = 1, max = 255, message = "File name must be 1-255 characters"))]
    pub name: String,

    #[validate(range(min = 0, message = "File size cannot be negative"))]
    pub size: i64,
}

/// Query string of the history endpoint
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct HistoryQuery {
    pub before: Option<MessageId>,

    #[validate(range(min = 1, max = 100, message = "Limit must be 1-100"))]
    pub limit: Option<i64>,
}

/// Query string of the delete endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessageQuery {
    #[serde(default)]
    pub for_everyone: bool,
}
