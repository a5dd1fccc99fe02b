//! Handler error types

use crate::engine::EngineError;
use crate::protocol::CloseCode;
use chat_core::DomainError;
use thiserror::Error;

/// Everything that ends a connection. Soft failures of a single event are
/// answered with an `error` dispatch instead and never become a `HandlerError`.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown op code")]
    UnknownOpcode,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// First frame was not Identify
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Already authenticated")]
    AlreadyAuthenticated,

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::InvalidPayload(_) => CloseCode::DecodeError,
            Self::UnknownOpcode => CloseCode::UnknownOpcode,
            Self::AuthenticationFailed(_) => CloseCode::AuthenticationFailed,
            Self::NotAuthenticated => CloseCode::NotAuthenticated,
            Self::AlreadyAuthenticated => CloseCode::AlreadyAuthenticated,
            Self::Timeout(_) => CloseCode::SessionTimeout,
            Self::Domain(_) | Self::Engine(_) | Self::Internal(_) => CloseCode::UnknownError,
        }
    }
}

/// Frame-level decode failures
impl From<CloseCode> for HandlerError {
    fn from(code: CloseCode) -> Self {
        match code {
            CloseCode::UnknownOpcode => Self::UnknownOpcode,
            other => Self::InvalidPayload(other.description().to_string()),
        }
    }
}

pub type HandlerResult<T> = Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_codes() {
        assert_eq!(HandlerError::NotAuthenticated.close_code().as_u16(), 4003);
        assert_eq!(
            HandlerError::AuthenticationFailed("bad".into()).close_code().as_u16(),
            4004
        );
        assert_eq!(HandlerError::AlreadyAuthenticated.close_code().as_u16(), 4005);
        assert_eq!(HandlerError::Timeout("identify").close_code().as_u16(), 4009);
        assert_eq!(HandlerError::from(EngineError::Stopped).close_code().as_u16(), 4000);
    }

    #[test]
    fn test_from_decode_close_code() {
        assert!(matches!(
            HandlerError::from(CloseCode::UnknownOpcode),
            HandlerError::UnknownOpcode
        ));
        assert_eq!(HandlerError::from(CloseCode::DecodeError).close_code().as_u16(), 4002);
    }
}
