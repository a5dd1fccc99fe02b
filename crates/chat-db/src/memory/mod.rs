//! In-process implementations of the collaborator traits
//!
//! Backed by `DashMap`, used by tests and by `STORE_BACKEND=memory`. The
//! message store can be switched into a failing mode to exercise the
//! store-unavailable paths.

mod chat;
mod message;
mod user;

pub use chat::MemoryChatDirectory;
pub use message::MemoryMessageStore;
pub use user::MemoryUserRepository;
