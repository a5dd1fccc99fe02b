//! Message endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use chat_service::dto::{
    CreateMessageRequest, DeleteMessageQuery, DeliveryStatusResponse, HistoryQuery,
    MessageResponse, UnreadCountResponse,
};
use chat_service::MessageService;

use super::error::{ApiResult, Created, NoContent};
use super::extractors::{parse_id, AuthUser, QueryParams, ValidatedJson};
use crate::server::GatewayState;

/// POST /api/chats/{chat_id}/messages
pub async fn send_message(
    State(state): State<GatewayState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    ValidatedJson(request): ValidatedJson<CreateMessageRequest>,
) -> ApiResult<Created<Json<MessageResponse>>> {
    let chat_id = parse_id(&chat_id, "chat_id")?;
    let response = MessageService::new(state.service_context())
        .send_message(chat_id, auth.user_id, request)
        .await?;
    Ok(Created(Json(response)))
}

/// GET /api/chats/{chat_id}/messages?before&limit
///
/// Returned messages from others count as read.
pub async fn list_messages(
    State(state): State<GatewayState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    QueryParams(query): QueryParams<HistoryQuery>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let chat_id = parse_id(&chat_id, "chat_id")?;
    let messages = MessageService::new(state.service_context())
        .list_messages(chat_id, auth.user_id, query)
        .await?;
    Ok(Json(messages))
}

/// GET /api/chats/{chat_id}/unread
pub async fn unread_count(
    State(state): State<GatewayState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<UnreadCountResponse>> {
    let chat_id = parse_id(&chat_id, "chat_id")?;
    let response = MessageService::new(state.service_context())
        .unread_count(chat_id, auth.user_id)
        .await?;
    Ok(Json(response))
}

/// GET /api/messages/{message_id}/status
pub async fn message_status(
    State(state): State<GatewayState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
) -> ApiResult<Json<DeliveryStatusResponse>> {
    let message_id = parse_id(&message_id, "message_id")?;
    let response = MessageService::new(state.service_context())
        .message_status(message_id, auth.user_id)
        .await?;
    Ok(Json(response))
}

/// DELETE /api/messages/{message_id}?forEveryone=bool
pub async fn delete_message(
    State(state): State<GatewayState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
    QueryParams(query): QueryParams<DeleteMessageQuery>,
) -> ApiResult<NoContent> {
    let message_id = parse_id(&message_id, "message_id")?;
    MessageService::new(state.service_context())
        .delete_message(message_id, auth.user_id, query.for_everyone)
        .await?;
    Ok(NoContent)
}
