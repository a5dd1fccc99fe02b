//! REST surface
//!
//! JSON over HTTP, authenticated with `Authorization: Bearer <jwt>`.

mod error;
mod extractors;
mod messages;
mod users;

pub use error::{ApiError, ApiResult, Created, ErrorBody, ErrorDetail, NoContent};
pub use extractors::{AuthUser, QueryParams, ValidatedJson};

use axum::{
    routing::{delete, get},
    Router,
};

use crate::server::GatewayState;

pub fn routes() -> Router<GatewayState> {
    Router::new().nest("/api", api_routes())
}

fn api_routes() -> Router<GatewayState> {
    Router::new()
        .route(
            "/chats/:chat_id/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/chats/:chat_id/unread", get(messages::unread_count))
        .route("/messages/:message_id", delete(messages::delete_message))
        .route("/messages/:message_id/status", get(messages::message_status))
        .route("/users/:user_id/presence", get(users::get_presence))
}
