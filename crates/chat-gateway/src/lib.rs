//! # chat-gateway
//!
//! Real-time presence and delivery-state engine behind a WebSocket gateway,
//! plus the REST endpoints for messages and presence.
//!
//! - [`engine`]: the single-owner core (connections, rooms, presence,
//!   typing, receipts)
//! - [`server`]: the axum router, socket tasks and start-up wiring
//! - [`api`]: REST handlers

pub mod api;
pub mod connection;
pub mod engine;
pub mod events;
pub mod handlers;
pub mod protocol;
pub mod server;

pub use engine::{Engine, EngineConfig, EngineError, GatewayHandle};
pub use server::{create_app, create_gateway_state, run, GatewayState, Stores};
