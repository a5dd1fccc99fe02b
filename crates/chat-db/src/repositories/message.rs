//! PostgreSQL implementation of MessageStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use chat_core::entities::{Message, DELETED_PLACEHOLDER};
use chat_core::error::DomainError;
use chat_core::traits::{DeliveryUpdate, MessageQuery, MessageStore, RepoResult};
use chat_core::value_objects::{ChatId, MessageId, UserId};

use crate::mappers::{assemble_messages, MessageInsert};
use crate::models::{DeliveryResultModel, MessageModel, ReceiptModel};

use super::error::map_db_error;

const MESSAGE_COLUMNS: &str = "m.id, m.chat_id, m.sender_id, m.content, m.kind, m.file_url, \
     m.file_name, m.file_size, m.reply_to, m.deleted, m.created_at";

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load receipts for `models` and build entities.
    async fn with_receipts(&self, models: Vec<MessageModel>) -> RepoResult<Vec<Message>> {
        if models.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = models.iter().map(|m| m.id).collect();

        let delivered = sqlx::query_as::<_, ReceiptModel>(
            r#"
            SELECT message_id, user_id, delivered_at AS at
            FROM message_deliveries
            WHERE message_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        let read = sqlx::query_as::<_, ReceiptModel>(
            r#"
            SELECT message_id, user_id, read_at AS at
            FROM message_reads
            WHERE message_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(assemble_messages(models, delivered, read))
    }

    async fn exists(&self, id: MessageId) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM messages WHERE id = $1)")
            .bind(id.into_inner())
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    #[instrument(skip(self, message), fields(message_id = %message.id, chat_id = %message.chat_id))]
    async fn create(&self, message: &Message) -> RepoResult<()> {
        let row = MessageInsert::new(message);
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        sqlx::query(
            r#"
            INSERT INTO messages
                (id, chat_id, sender_id, content, kind, file_url, file_name, file_size, reply_to, deleted, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(row.id)
        .bind(row.chat_id)
        .bind(row.sender_id)
        .bind(row.content)
        .bind(row.kind)
        .bind(row.file_url)
        .bind(row.file_name)
        .bind(row.file_size)
        .bind(row.reply_to)
        .bind(message.deleted)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        for (user, at) in message.delivery.delivered() {
            sqlx::query(
                "INSERT INTO message_deliveries (message_id, user_id, delivered_at) VALUES ($1, $2, $3)",
            )
            .bind(row.id)
            .bind(user.into_inner())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }
        for (user, at) in message.delivery.read() {
            sqlx::query("INSERT INTO message_reads (message_id, user_id, read_at) VALUES ($1, $2, $3)")
                .bind(row.id)
                .bind(user.into_inner())
                .bind(at)
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
        }

        tx.commit().await.map_err(map_db_error)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: MessageId) -> RepoResult<Option<Message>> {
        let model = sqlx::query_as::<_, MessageModel>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = $1"
        ))
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        match model {
            Some(model) => Ok(self.with_receipts(vec![model]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn find_by_chat(
        &self,
        chat_id: ChatId,
        viewer: UserId,
        query: MessageQuery,
    ) -> RepoResult<Vec<Message>> {
        let mut models = sqlx::query_as::<_, MessageModel>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages m
            WHERE m.chat_id = $1
              AND m.deleted = FALSE
              AND ($2::BIGINT IS NULL OR m.id < $2)
              AND NOT EXISTS (
                  SELECT 1 FROM message_hidden h
                  WHERE h.message_id = m.id AND h.user_id = $3
              )
            ORDER BY m.id DESC
            LIMIT $4
            "#
        ))
        .bind(chat_id.into_inner())
        .bind(query.before.map(MessageId::into_inner))
        .bind(viewer.into_inner())
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        models.reverse();
        self.with_receipts(models).await
    }

    #[instrument(skip(self))]
    async fn record_delivered(
        &self,
        message_id: MessageId,
        user: UserId,
        at: DateTime<Utc>,
    ) -> RepoResult<DeliveryUpdate> {
        // The outer SELECT reads the pre-insert snapshot, so `d` is only
        // populated when the row already existed.
        let row = sqlx::query_as::<_, DeliveryResultModel>(
            r#"
            WITH target AS (
                SELECT id, chat_id FROM messages WHERE id = $1
            ),
            inserted AS (
                INSERT INTO message_deliveries (message_id, user_id, delivered_at)
                SELECT id, $2, $3 FROM target
                ON CONFLICT (message_id, user_id) DO NOTHING
                RETURNING delivered_at
            )
            SELECT t.chat_id,
                   COALESCE(i.delivered_at, d.delivered_at, $3) AS delivered_at,
                   (i.delivered_at IS NOT NULL) AS newly_delivered
            FROM target t
            LEFT JOIN inserted i ON TRUE
            LEFT JOIN message_deliveries d ON d.message_id = t.id AND d.user_id = $2
            "#,
        )
        .bind(message_id.into_inner())
        .bind(user.into_inner())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .ok_or(DomainError::MessageNotFound(message_id))?;

        Ok(DeliveryUpdate {
            chat_id: ChatId::new(row.chat_id),
            delivered_at: row.delivered_at,
            newly_delivered: row.newly_delivered,
        })
    }

    #[instrument(skip(self, message_ids), fields(count = message_ids.len()))]
    async fn record_read(
        &self,
        chat_id: ChatId,
        message_ids: &[MessageId],
        user: UserId,
        at: DateTime<Utc>,
    ) -> RepoResult<Vec<MessageId>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = message_ids.iter().map(|id| id.into_inner()).collect();

        let newly_read = sqlx::query_scalar::<_, i64>(
            r#"
            WITH targets AS (
                SELECT id FROM messages WHERE chat_id = $1 AND id = ANY($2)
            ),
            delivered AS (
                INSERT INTO message_deliveries (message_id, user_id, delivered_at)
                SELECT id, $3, $4 FROM targets
                ON CONFLICT (message_id, user_id) DO NOTHING
            )
            INSERT INTO message_reads (message_id, user_id, read_at)
            SELECT id, $3, $4 FROM targets
            ON CONFLICT (message_id, user_id) DO NOTHING
            RETURNING message_id
            "#,
        )
        .bind(chat_id.into_inner())
        .bind(&ids)
        .bind(user.into_inner())
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        let mut newly_read: Vec<MessageId> = newly_read.into_iter().map(MessageId::new).collect();
        newly_read.sort_unstable();
        Ok(newly_read)
    }

    #[instrument(skip(self))]
    async fn hide_for_user(&self, message_id: MessageId, user: UserId) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO message_hidden (message_id, user_id)
            SELECT id, $2 FROM messages WHERE id = $1
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(message_id.into_inner())
        .bind(user.into_inner())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        // Zero rows is either an unknown message or an existing tombstone.
        if result.rows_affected() == 0 && !self.exists(message_id).await? {
            return Err(DomainError::MessageNotFound(message_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_for_everyone(&self, message_id: MessageId) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET deleted = TRUE, content = $2, file_url = NULL, file_name = NULL, file_size = NULL
            WHERE id = $1
            "#,
        )
        .bind(message_id.into_inner())
        .bind(DELETED_PLACEHOLDER)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::MessageNotFound(message_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unread_count(&self, chat_id: ChatId, user: UserId) -> RepoResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages m
            WHERE m.chat_id = $1
              AND m.sender_id <> $2
              AND m.deleted = FALSE
              AND NOT EXISTS (
                  SELECT 1 FROM message_reads r WHERE r.message_id = m.id AND r.user_id = $2
              )
              AND NOT EXISTS (
                  SELECT 1 FROM message_hidden h WHERE h.message_id = m.id AND h.user_id = $2
              )
            "#,
        )
        .bind(chat_id.into_inner())
        .bind(user.into_inner())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }
}
