//! User endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use chat_service::dto::PresenceResponse;
use chat_service::PresenceService;

use super::error::ApiResult;
use super::extractors::{parse_id, AuthUser};
use crate::server::GatewayState;

/// GET /api/users/{user_id}/presence
pub async fn get_presence(
    State(state): State<GatewayState>,
    _auth: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<PresenceResponse>> {
    let user_id = parse_id(&user_id, "user_id")?;
    let response = PresenceService::new(state.service_context())
        .get_presence(user_id)
        .await?;
    Ok(Json(response))
}
