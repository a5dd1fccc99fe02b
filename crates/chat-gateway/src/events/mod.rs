//! Real-time event sum types
//!
//! Payloads are validated here, at the boundary; the engine only ever sees
//! typed events.

mod client;
mod server;

pub use client::{ClientEvent, MAX_READ_BATCH};
pub use server::{EncodedEvent, ServerEvent};
