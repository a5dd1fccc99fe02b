//! # chat-core
//!
//! Domain layer: typed identifiers, entities, receipts and the collaborator
//! traits the real-time engine and the message service depend on.
//! No infrastructure dependencies.

pub mod entities;
pub mod error;
pub mod traits;
pub mod value_objects;

pub use entities::{
    Chat, DeliveryRecord, FileAttachment, Message, MessageKind, User, DELETED_PLACEHOLDER,
};
pub use error::DomainError;
pub use traits::{
    ChatDirectory, CredentialVerifier, DeliveryUpdate, MessageQuery, MessageStore, RepoResult,
    UserRepository,
};
pub use value_objects::{ChatId, MessageId, Snowflake, SnowflakeGenerator, SnowflakeParseError, UserId};
