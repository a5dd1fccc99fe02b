//! # chat-service
//!
//! Application layer: message and presence use cases, and the DTOs shared
//! by the REST API and the real-time gateway.

pub mod dto;
pub mod services;

pub use services::{
    MessageService, NoopNotifier, PresenceService, RealtimeNotifier, ServiceContext,
    ServiceContextBuilder, ServiceError, ServiceResult,
};
