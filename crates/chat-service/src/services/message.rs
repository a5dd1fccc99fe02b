//! Message service
//!
//! Sending, history, delivery status and deletion over REST. Every write is
//! persisted first and then handed to the real-time engine.

use chat_core::entities::{FileAttachment, Message};
use chat_core::traits::MessageQuery;
use chat_core::{ChatId, DomainError, MessageId, UserId};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::dto::{
    CreateMessageRequest, DeliveryStatusResponse, HistoryQuery, MessageResponse,
    UnreadCountResponse,
};

use super::context::ServiceContext;
use super::error::ServiceResult;

/// Message service
pub struct MessageService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> MessageService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Store a new message and forward it to the chat room
    ///
    /// The sender starts out in both the delivered and the read set.
    #[instrument(skip(self, request))]
    pub async fn send_message(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        request: CreateMessageRequest,
    ) -> ServiceResult<MessageResponse> {
        request.validate()?;
        self.require_member(chat_id, sender_id).await?;

        match (request.kind.expects_file(), request.file.is_some()) {
            (true, false) => {
                return Err(DomainError::ValidationError(format!(
                    "{} messages need a file",
                    request.kind
                ))
                .into())
            }
            (false, true) => {
                return Err(
                    DomainError::ValidationError("text messages cannot carry a file".into()).into(),
                )
            }
            _ => {}
        }

        if let Some(reply_to) = request.reply_to {
            let original = self
                .ctx
                .message_store()
                .find_by_id(reply_to)
                .await?
                .ok_or(DomainError::MessageNotFound(reply_to))?;
            if original.chat_id != chat_id {
                return Err(DomainError::ValidationError(
                    "Replies must stay in the same chat".into(),
                )
                .into());
            }
        }

        let mut message = Message::new(
            self.ctx.generate_id().into(),
            chat_id,
            sender_id,
            request.content.trim().to_string(),
        );
        if let Some(file) = request.file {
            message = message.with_file(
                request.kind,
                FileAttachment {
                    url: file.url,
                    name: file.name,
                    size: file.size,
                },
            );
        }
        if let Some(reply_to) = request.reply_to {
            message = message.replying_to(reply_to);
        }
        if message.is_empty() {
            return Err(DomainError::EmptyMessage.into());
        }

        self.ctx.message_store().create(&message).await?;

        if let Err(e) = self
            .ctx
            .chat_directory()
            .touch_last_message(chat_id, message.id)
            .await
        {
            warn!(chat_id = %chat_id, error = %e, "Failed to update last message");
        }

        info!(message_id = %message.id, chat_id = %chat_id, "Message created");

        let response = MessageResponse::from(&message);
        self.ctx.notifier().message_created(&response).await;
        Ok(response)
    }

    /// Page of history, oldest first
    ///
    /// Fetching history reads it: every returned message from someone else
    /// that `viewer` had not read yet is marked read and announced.
    #[instrument(skip(self, query))]
    pub async fn list_messages(
        &self,
        chat_id: ChatId,
        viewer: UserId,
        query: HistoryQuery,
    ) -> ServiceResult<Vec<MessageResponse>> {
        query.validate()?;
        self.require_member(chat_id, viewer).await?;

        let mut messages = self
            .ctx
            .message_store()
            .find_by_chat(chat_id, viewer, MessageQuery::new(query.before, query.limit))
            .await?;

        let unread: Vec<MessageId> = messages
            .iter()
            .filter(|m| m.is_unread_for(viewer))
            .map(|m| m.id)
            .collect();

        if !unread.is_empty() {
            let read_at = Utc::now();
            let newly_read = match self
                .ctx
                .notifier()
                .mark_read(chat_id, viewer, unread.clone(), read_at)
                .await
            {
                Some(result) => result?,
                None => {
                    self.ctx
                        .message_store()
                        .record_read(chat_id, &unread, viewer, read_at)
                        .await?
                }
            };

            for message in messages.iter_mut().filter(|m| newly_read.contains(&m.id)) {
                message.delivery.mark_read(viewer, read_at);
            }
            if !newly_read.is_empty() {
                debug!(chat_id = %chat_id, count = newly_read.len(), "History marked read");
            }
        }

        Ok(messages.iter().map(MessageResponse::from).collect())
    }

    /// Who has received and read a message
    #[instrument(skip(self))]
    pub async fn message_status(
        &self,
        message_id: MessageId,
        user_id: UserId,
    ) -> ServiceResult<DeliveryStatusResponse> {
        let message = self.find_message(message_id).await?;
        self.require_member(message.chat_id, user_id).await?;
        Ok(DeliveryStatusResponse::from(&message))
    }

    /// Delete a message for everyone (author only) or hide it for the caller
    #[instrument(skip(self))]
    pub async fn delete_message(
        &self,
        message_id: MessageId,
        user_id: UserId,
        for_everyone: bool,
    ) -> ServiceResult<()> {
        let message = self.find_message(message_id).await?;
        self.require_member(message.chat_id, user_id).await?;

        if !for_everyone {
            self.ctx
                .message_store()
                .hide_for_user(message_id, user_id)
                .await?;
            debug!(message_id = %message_id, user_id = %user_id, "Message hidden");
            return Ok(());
        }

        if message.sender_id != user_id {
            return Err(DomainError::NotMessageAuthor.into());
        }
        if message.deleted {
            return Ok(());
        }

        self.ctx
            .message_store()
            .delete_for_everyone(message_id)
            .await?;
        info!(message_id = %message_id, chat_id = %message.chat_id, "Message deleted for everyone");

        self.ctx
            .notifier()
            .message_deleted(message.chat_id, message_id)
            .await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unread_count(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> ServiceResult<UnreadCountResponse> {
        self.require_member(chat_id, user_id).await?;
        let unread_count = self
            .ctx
            .message_store()
            .unread_count(chat_id, user_id)
            .await?;
        Ok(UnreadCountResponse {
            chat_id,
            unread_count,
        })
    }

    async fn find_message(&self, message_id: MessageId) -> ServiceResult<Message> {
        Ok(self
            .ctx
            .message_store()
            .find_by_id(message_id)
            .await?
            .ok_or(DomainError::MessageNotFound(message_id))?)
    }

    /// Unknown chat and non-membership are reported separately.
    async fn require_member(&self, chat_id: ChatId, user_id: UserId) -> ServiceResult<()> {
        let chat = self
            .ctx
            .chat_directory()
            .find_by_id(chat_id)
            .await?
            .ok_or(DomainError::ChatNotFound(chat_id))?;
        if !chat.has_member(user_id) {
            return Err(DomainError::NotAMember.into());
        }
        Ok(())
    }
}
