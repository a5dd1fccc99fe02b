//! Value objects - immutable identifiers

mod ids;
mod snowflake;

pub use ids::{ChatId, MessageId, UserId};
pub use snowflake::{Snowflake, SnowflakeGenerator, SnowflakeParseError};
