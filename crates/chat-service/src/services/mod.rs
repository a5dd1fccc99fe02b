//! Business logic services
//!
//! Services borrow a [`ServiceContext`] for the duration of one request.

pub mod context;
pub mod error;
pub mod message;
pub mod notifier;
pub mod presence;

pub use context::{ServiceContext, ServiceContextBuilder};
pub use error::{ServiceError, ServiceResult};
pub use message::MessageService;
pub use notifier::{NoopNotifier, RealtimeNotifier};
pub use presence::PresenceService;
