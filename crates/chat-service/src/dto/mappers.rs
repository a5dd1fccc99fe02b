//! Entity -> DTO conversions

use chat_core::entities::Message;

use super::responses::{DeliveryStatusResponse, MessageResponse, ReceiptResponse};

impl From<&Message> for MessageResponse {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            kind: message.kind,
            file: message.file.clone(),
            reply_to: message.reply_to,
            deleted: message.deleted,
            created_at: message.created_at,
            delivered_to: message.delivery.delivered().map(|(user, _)| user).collect(),
            read_by: message.delivery.read().map(|(user, _)| user).collect(),
            delivered_count: message.delivery.delivered_count(),
            read_count: message.delivery.read_count(),
        }
    }
}

impl From<&Message> for DeliveryStatusResponse {
    fn from(message: &Message) -> Self {
        let receipt = |(user_id, at)| ReceiptResponse { user_id, at };
        Self {
            message_id: message.id,
            chat_id: message.chat_id,
            delivered: message.delivery.delivered().map(receipt).collect(),
            read: message.delivery.read().map(receipt).collect(),
            delivered_count: message.delivery.delivered_count(),
            read_count: message.delivery.read_count(),
        }
    }
}
