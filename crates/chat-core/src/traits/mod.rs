//! Ports implemented by the infrastructure crates

mod repositories;

pub use repositories::{
    ChatDirectory, CredentialVerifier, DeliveryUpdate, MessageQuery, MessageStore, RepoResult,
    UserRepository,
};
