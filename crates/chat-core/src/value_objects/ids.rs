//! Typed identifiers so a chat id can never be passed where a user id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::snowflake::{Snowflake, SnowflakeParseError};

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Snowflake);

        impl $name {
            #[inline]
            pub const fn new(id: i64) -> Self {
                Self(Snowflake::new(id))
            }

            #[inline]
            pub const fn into_inner(self) -> i64 {
                self.0.into_inner()
            }

            #[inline]
            pub const fn snowflake(self) -> Snowflake {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Snowflake> for $name {
            fn from(id: Snowflake) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Snowflake {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self::new(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.into_inner()
            }
        }

        impl FromStr for $name {
            type Err = SnowflakeParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Snowflake::parse(s).map(Self)
            }
        }
    };
}

snowflake_id!(
    /// Account identity issued by the authentication collaborator
    UserId
);
snowflake_id!(
    /// Conversation identity; membership lives in the chat directory
    ChatId
);
snowflake_id!(MessageId);
