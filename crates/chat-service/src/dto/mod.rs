//! Data transfer objects for the REST API and gateway payloads

pub mod mappers;
pub mod requests;
pub mod responses;

pub use requests::{
    CreateMessageRequest, DeleteMessageQuery, FileRequest, HistoryQuery, MAX_CONTENT_LENGTH,
};
pub use responses::{
    DeliveryStatusResponse, MessageResponse, PresenceResponse, ReceiptResponse,
    UnreadCountResponse,
};
