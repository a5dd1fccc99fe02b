//! Chat database models

use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct ChatModel {
    pub id: i64,
    pub name: Option<String>,
    pub is_group: bool,
    pub admin_id: Option<i64>,
    pub last_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
