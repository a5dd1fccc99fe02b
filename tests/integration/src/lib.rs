//! Integration test utilities for the chat gateway
//!
//! Starts the real router on an ephemeral port, backed by in-memory stores,
//! and talks to it over HTTP and WebSocket.

pub mod helpers;
pub mod ws;

pub use helpers::*;
pub use ws::*;
