//! Database models - SQLx row types

mod chat;
mod message;
mod user;

pub use chat::ChatModel;
pub use message::{DeliveryResultModel, MessageModel, ReceiptModel};
pub use user::UserModel;
