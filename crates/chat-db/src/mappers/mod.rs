//! Entity <-> model mappers
//!
//! Rows become entities through `From`/`into_*`; `*Insert` structs prepare
//! entity data for binding.

mod chat;
mod message;
mod user;

pub use message::{assemble_messages, MessageInsert};
