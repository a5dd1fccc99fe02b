//! Response DTOs
//!
//! Field names are camelCase on the wire; ids are strings.

use chat_core::{ChatId, FileAttachment, MessageId, MessageKind, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full message record, as returned by the REST API and forwarded in
/// `new-message` events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub delivered_to: Vec<UserId>,
    pub read_by: Vec<UserId>,
    pub delivered_count: usize,
    pub read_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptResponse {
    pub user_id: UserId,
    pub at: DateTime<Utc>,
}

/// Delivery state of one message. Counts are derived from the lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusResponse {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub delivered: Vec<ReceiptResponse>,
    pub read: Vec<ReceiptResponse>,
    pub delivered_count: usize,
    pub read_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub chat_id: ChatId,
    pub unread_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub user_id: UserId,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
}
