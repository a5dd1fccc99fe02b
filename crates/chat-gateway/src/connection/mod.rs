//! Connections and the registry that owns them

mod connection;
mod registry;

pub use connection::{Connection, ConnectionId, SendStatus};
pub use registry::ConnectionRegistry;

#[cfg(test)]
pub(crate) use connection::test_support;
