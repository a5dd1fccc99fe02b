//! Domain entities

mod chat;
mod delivery;
mod message;
mod user;

pub use chat::Chat;
pub use delivery::DeliveryRecord;
pub use message::{FileAttachment, Message, MessageKind, DELETED_PLACEHOLDER};
pub use user::User;
