//! PostgreSQL implementations of the chat-core collaborator traits

mod chat;
mod error;
mod message;
mod user;

pub use chat::PgChatDirectory;
pub use error::map_db_error;
pub use message::PgMessageStore;
pub use user::PgUserRepository;
