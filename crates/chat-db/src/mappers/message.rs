//! Message entity <-> model mapper

use std::collections::HashMap;

use chat_core::entities::{DeliveryRecord, FileAttachment, Message};
use chat_core::value_objects::{ChatId, MessageId, UserId};

use crate::models::{MessageModel, ReceiptModel};

impl MessageModel {
    /// Combine the row with its receipts
    pub fn into_message(self, delivery: DeliveryRecord) -> Message {
        let file = match (self.file_url, self.file_name) {
            (Some(url), Some(name)) => Some(FileAttachment {
                url,
                name,
                size: self.file_size.unwrap_or(0),
            }),
            _ => None,
        };

        Message {
            id: MessageId::new(self.id),
            chat_id: ChatId::new(self.chat_id),
            sender_id: UserId::new(self.sender_id),
            content: self.content,
            // The CHECK constraint keeps unknown kinds out.
            kind: self.kind.parse().unwrap_or_default(),
            file,
            reply_to: self.reply_to.map(MessageId::new),
            deleted: self.deleted,
            created_at: self.created_at,
            delivery,
        }
    }
}

/// Attach delivered/read rows to their messages, preserving the row order.
pub fn assemble_messages(
    models: Vec<MessageModel>,
    delivered: Vec<ReceiptModel>,
    read: Vec<ReceiptModel>,
) -> Vec<Message> {
    let mut delivered_by: HashMap<i64, Vec<_>> = HashMap::new();
    for row in delivered {
        delivered_by
            .entry(row.message_id)
            .or_default()
            .push((UserId::new(row.user_id), row.at));
    }
    let mut read_by: HashMap<i64, Vec<_>> = HashMap::new();
    for row in read {
        read_by
            .entry(row.message_id)
            .or_default()
            .push((UserId::new(row.user_id), row.at));
    }

    models
        .into_iter()
        .map(|model| {
            let delivery = DeliveryRecord::from_entries(
                delivered_by.remove(&model.id).unwrap_or_default(),
                read_by.remove(&model.id).unwrap_or_default(),
            );
            model.into_message(delivery)
        })
        .collect()
}

/// Column values of a new `messages` row
pub struct MessageInsert<'a> {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: &'a str,
    pub kind: &'static str,
    pub file_url: Option<&'a str>,
    pub file_name: Option<&'a str>,
    pub file_size: Option<i64>,
    pub reply_to: Option<i64>,
}

impl<'a> MessageInsert<'a> {
    pub fn new(message: &'a Message) -> Self {
        let file = message.file.as_ref();
        Self {
            id: message.id.into_inner(),
            chat_id: message.chat_id.into_inner(),
            sender_id: message.sender_id.into_inner(),
            content: &message.content,
            kind: message.kind.as_str(),
            file_url: file.map(|f| f.url.as_str()),
            file_name: file.map(|f| f.name.as_str()),
            file_size: file.map(|f| f.size),
            reply_to: message.reply_to.map(MessageId::into_inner),
        }
    }
}
