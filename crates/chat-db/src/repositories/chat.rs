//! PostgreSQL implementation of ChatDirectory

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use chat_core::entities::Chat;
use chat_core::error::DomainError;
use chat_core::traits::{ChatDirectory, RepoResult};
use chat_core::value_objects::{ChatId, MessageId, UserId};

use crate::models::ChatModel;

use super::error::map_db_error;

#[derive(Clone)]
pub struct PgChatDirectory {
    pool: PgPool,
}

impl PgChatDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatDirectory for PgChatDirectory {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: ChatId) -> RepoResult<Option<Chat>> {
        let model = sqlx::query_as::<_, ChatModel>(
            r#"
            SELECT id, name, is_group, admin_id, last_message_id, created_at, updated_at
            FROM chats
            WHERE id = $1
            "#,
        )
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        let Some(model) = model else {
            return Ok(None);
        };

        let members = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM chat_members WHERE chat_id = $1 ORDER BY position, user_id",
        )
        .bind(id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(Some(model.into_chat(members)))
    }

    #[instrument(skip(self))]
    async fn is_member(&self, chat_id: ChatId, user_id: UserId) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM chat_members WHERE chat_id = $1 AND user_id = $2)",
        )
        .bind(chat_id.into_inner())
        .bind(user_id.into_inner())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }

    #[instrument(skip(self, chat), fields(chat_id = %chat.id))]
    async fn create(&self, chat: &Chat) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        sqlx::query(
            r#"
            INSERT INTO chats (id, name, is_group, admin_id, last_message_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(chat.id.into_inner())
        .bind(chat.name.as_deref())
        .bind(chat.is_group)
        .bind(chat.admin_id.map(UserId::into_inner))
        .bind(chat.last_message_id.map(MessageId::into_inner))
        .bind(chat.created_at)
        .bind(chat.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        for (position, member) in chat.members.iter().enumerate() {
            sqlx::query("INSERT INTO chat_members (chat_id, user_id, position) VALUES ($1, $2, $3)")
                .bind(chat.id.into_inner())
                .bind(member.into_inner())
                .bind(position as i32)
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
        }

        tx.commit().await.map_err(map_db_error)
    }

    #[instrument(skip(self))]
    async fn touch_last_message(&self, chat_id: ChatId, message_id: MessageId) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE chats SET last_message_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(chat_id.into_inner())
        .bind(message_id.into_inner())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ChatNotFound(chat_id));
        }
        Ok(())
    }
}
