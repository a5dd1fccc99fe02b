//! # chat-db
//!
//! Persistence collaborators for the chat core.
//!
//! - PostgreSQL stores (`sqlx`) with the schema under `migrations/`
//! - In-memory stores for tests and single-process development runs
//!
//! ```rust,ignore
//! use chat_db::{create_pool, run_migrations, PgMessageStore, PoolConfig};
//!
//! let pool = create_pool(&PoolConfig::new(database_url)).await?;
//! run_migrations(&pool, None).await?;
//! let messages = PgMessageStore::new(pool);
//! ```

pub mod mappers;
pub mod memory;
pub mod models;
pub mod pool;
pub mod repositories;

pub use memory::{MemoryChatDirectory, MemoryMessageStore, MemoryUserRepository};
pub use pool::{create_pool, run_migrations, PgPool, PoolConfig, MIGRATIONS_DIR};
pub use repositories::{PgChatDirectory, PgMessageStore, PgUserRepository};
