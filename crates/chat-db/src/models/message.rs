//! Message and receipt database models

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Row of the `messages` table
#[derive(Debug, Clone, FromRow)]
pub struct MessageModel {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub kind: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub reply_to: Option<i64>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Row of `message_deliveries` or `message_reads`, with the timestamp
/// column aliased to `at`
#[derive(Debug, Clone, FromRow)]
pub struct ReceiptModel {
    pub message_id: i64,
    pub user_id: i64,
    pub at: DateTime<Utc>,
}

/// Result of the delivery upsert
#[derive(Debug, Clone, FromRow)]
pub struct DeliveryResultModel {
    pub chat_id: i64,
    pub delivered_at: DateTime<Utc>,
    pub newly_delivered: bool,
}
