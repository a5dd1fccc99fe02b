//! Identify handler (op 2)

use chat_core::{CredentialVerifier, UserId, UserRepository};

use super::{HandlerError, HandlerResult};
use crate::protocol::{GatewayMessage, OpCode};

/// Turns the first frame of a connection into a user
pub struct IdentifyHandler;

impl IdentifyHandler {
    /// The first frame must be an Identify carrying a credential for an
    /// existing user. Nothing is registered until this succeeds.
    pub async fn handle(
        message: &GatewayMessage,
        verifier: &dyn CredentialVerifier,
        users: &dyn UserRepository,
    ) -> HandlerResult<UserId> {
        if message.op != OpCode::Identify {
            tracing::debug!(op = %message.op, "First frame was not Identify");
            return Err(HandlerError::NotAuthenticated);
        }
        let payload = message
            .as_identify()
            .ok_or_else(|| HandlerError::InvalidPayload("Invalid Identify payload".to_string()))?;

        let user_id = verifier
            .verify_credential(payload.bare_token())
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "Credential rejected");
                HandlerError::AuthenticationFailed(e.to_string())
            })?;

        match users.exists(user_id).await {
            Ok(true) => Ok(user_id),
            Ok(false) => Err(HandlerError::AuthenticationFailed(format!(
                "unknown user {user_id}"
            ))),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "User lookup failed during Identify");
                Err(HandlerError::Domain(e))
            }
        }
    }
}
