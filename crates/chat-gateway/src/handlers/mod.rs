//! Op code handlers
//!
//! Everything between a decoded frame and an engine command lives here, so
//! it can be exercised without a socket.

mod error;
mod heartbeat;
mod identify;

pub use error::{HandlerError, HandlerResult};
pub use heartbeat::HeartbeatMonitor;
pub use identify::IdentifyHandler;

use chat_core::{ChatDirectory, UserId};

use crate::connection::ConnectionId;
use crate::engine::GatewayHandle;
use crate::events::{ClientEvent, ServerEvent};
use crate::protocol::{GatewayMessage, OpCode};

/// A decoded frame from an identified connection
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Heartbeat,
    Event(ClientEvent),
    /// Op 3 with an unknown name or a payload that does not fit it
    Invalid { event: Option<String>, reason: String },
}

pub struct MessageDispatcher;

impl MessageDispatcher {
    /// Sort a frame received after Identify. Errors close the connection.
    pub fn classify(message: GatewayMessage) -> HandlerResult<Inbound> {
        if !message.op.is_client_op() {
            tracing::warn!(op = %message.op, "Received server-only op code from client");
            return Err(HandlerError::UnknownOpcode);
        }

        match message.op {
            OpCode::Heartbeat => Ok(Inbound::Heartbeat),
            OpCode::Identify => Err(HandlerError::AlreadyAuthenticated),
            OpCode::Event => {
                let Some(name) = message.t else {
                    return Ok(Inbound::Invalid {
                        event: None,
                        reason: "missing event name".to_string(),
                    });
                };
                let checked = ClientEvent::from_parts(&name, message.d)
                    .map_err(|e| e.to_string())
                    .and_then(|event| event.check_limits().map(|()| event));
                match checked {
                    Ok(event) => Ok(Inbound::Event(event)),
                    Err(reason) => Ok(Inbound::Invalid {
                        event: Some(name),
                        reason,
                    }),
                }
            }
            _ => Err(HandlerError::UnknownOpcode),
        }
    }

    /// Forward one event to the engine. join-room is checked against the
    /// chat directory first; a refused join is answered, not forwarded.
    pub async fn dispatch_event(
        engine: &GatewayHandle,
        chats: &dyn ChatDirectory,
        connection: ConnectionId,
        user_id: UserId,
        event: ClientEvent,
    ) -> HandlerResult<()> {
        if let ClientEvent::JoinRoom { chat_id } = event {
            let refusal = match chats.is_member(chat_id, user_id).await {
                Ok(true) => None,
                Ok(false) => Some(ServerEvent::error(
                    "NOT_A_MEMBER",
                    format!("not a member of chat {chat_id}"),
                    Some("join-room"),
                )),
                Err(e) => {
                    tracing::warn!(chat_id = %chat_id, user_id = %user_id, error = %e, "Membership lookup failed");
                    let code = if e.is_store_unavailable() {
                        "STORE_UNAVAILABLE"
                    } else {
                        e.code()
                    };
                    Some(ServerEvent::error(code, e.to_string(), Some("join-room")))
                }
            };
            if let Some(refusal) = refusal {
                tracing::debug!(connection_id = %connection, chat_id = %chat_id, "Join refused");
                engine.send(connection, refusal).await?;
                return Ok(());
            }
        }

        tracing::trace!(connection_id = %connection, event = event.name(), "Event received");
        engine.event(connection, event).await?;
        Ok(())
    }

    /// Answer a malformed event without closing the connection.
    pub async fn reject_event(
        engine: &GatewayHandle,
        connection: ConnectionId,
        event: Option<String>,
        reason: String,
    ) -> HandlerResult<()> {
        tracing::debug!(connection_id = %connection, event = ?event, reason = %reason, "Invalid event");
        let error = ServerEvent::error("INVALID_PAYLOAD", reason, event.as_deref());
        engine.send(connection, error).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chat_core::{Chat, ChatId};
    use chat_db::{MemoryChatDirectory, MemoryMessageStore, MemoryUserRepository};
    use serde_json::json;

    use crate::connection::test_support::{connection, TestSocket};
    use crate::engine::{Engine, EngineConfig};
    use crate::events::MAX_READ_BATCH;

    const CHAT: ChatId = ChatId::new(100);
    const ANA: UserId = UserId::new(1);
    const BEN: UserId = UserId::new(2);
    const MALLORY: UserId = UserId::new(3);

    #[test]
    fn test_classify_event() {
        let message = GatewayMessage::event("join-room", json!({ "chatId": "100" }));
        assert_eq!(
            MessageDispatcher::classify(message).unwrap(),
            Inbound::Event(ClientEvent::JoinRoom { chat_id: CHAT })
        );
        assert_eq!(
            MessageDispatcher::classify(GatewayMessage::heartbeat()).unwrap(),
            Inbound::Heartbeat
        );
    }

    #[test]
    fn test_classify_rejects_oversized_read_batch() {
        let ids: Vec<String> = (1..=MAX_READ_BATCH as i64 + 1).map(|i| i.to_string()).collect();
        let message = GatewayMessage::event("mark-read", json!({ "chatId": "100", "messageIds": ids }));
        let Inbound::Invalid { event, reason } = MessageDispatcher::classify(message).unwrap() else {
            panic!("expected an invalid event");
        };
        assert_eq!(event.as_deref(), Some("mark-read"));
        assert!(reason.contains("at most"));
    }

    #[test]
    fn test_classify_bad_event_is_soft() {
        let message = GatewayMessage::event("fly-away", json!({}));
        let Inbound::Invalid { event, .. } = MessageDispatcher::classify(message).unwrap() else {
            panic!("expected an invalid event");
        };
        assert_eq!(event.as_deref(), Some("fly-away"));

        let message = GatewayMessage::event("mark-read", json!({ "chatId": "nope" }));
        assert!(matches!(
            MessageDispatcher::classify(message).unwrap(),
            Inbound::Invalid { .. }
        ));
    }

    #[test]
    fn test_classify_protocol_violations() {
        assert!(matches!(
            MessageDispatcher::classify(GatewayMessage::identify("again")),
            Err(HandlerError::AlreadyAuthenticated)
        ));
        assert!(matches!(
            MessageDispatcher::classify(GatewayMessage::heartbeat_ack()),
            Err(HandlerError::UnknownOpcode)
        ));
    }

    async fn setup() -> (GatewayHandle, MemoryChatDirectory) {
        let chats = MemoryChatDirectory::default();
        chats.create(&Chat::direct(CHAT, ANA, BEN)).await.unwrap();
        let (engine, handle) = Engine::new(
            EngineConfig::default(),
            Arc::new(MemoryMessageStore::default()),
            Arc::new(MemoryUserRepository::default()),
        );
        engine.spawn();
        (handle, chats)
    }

    async fn connect(handle: &GatewayHandle, user: UserId) -> (ConnectionId, TestSocket) {
        let (conn, mut socket) = connection(user, 16);
        let id = conn.id();
        handle.connect(conn).await.unwrap();
        socket.outbound.recv().await.unwrap(); // ready
        (id, socket)
    }

    #[tokio::test]
    async fn test_non_member_join_is_refused() {
        let (handle, chats) = setup().await;
        let (id, mut socket) = connect(&handle, MALLORY).await;

        MessageDispatcher::dispatch_event(
            &handle,
            &chats,
            id,
            MALLORY,
            ClientEvent::JoinRoom { chat_id: CHAT },
        )
        .await
        .unwrap();

        let message = socket.outbound.recv().await.unwrap();
        assert_eq!(message.t.as_deref(), Some("error"));
        assert_eq!(message.d.unwrap()["code"], json!("NOT_A_MEMBER"));
    }

    #[tokio::test]
    async fn test_member_join_reaches_room() {
        let (handle, chats) = setup().await;
        let (ana, _ana_socket) = connect(&handle, ANA).await;
        let (ben, mut ben_socket) = connect(&handle, BEN).await;
        for (id, user) in [(ana, ANA), (ben, BEN)] {
            MessageDispatcher::dispatch_event(
                &handle,
                &chats,
                id,
                user,
                ClientEvent::JoinRoom { chat_id: CHAT },
            )
            .await
            .unwrap();
        }

        let typing = ClientEvent::TypingStart {
            chat_id: CHAT,
            user_display_name: "Ana".into(),
        };
        MessageDispatcher::dispatch_event(&handle, &chats, ana, ANA, typing)
            .await
            .unwrap();

        // Ben first hears Ana come online, then the typing signal.
        let mut names = Vec::new();
        while names.last().map(String::as_str) != Some("typing-start") {
            let message = ben_socket.outbound.recv().await.unwrap();
            names.push(message.t.unwrap_or_default());
        }
        assert!(!names.contains(&"error".to_string()));
    }

    #[tokio::test]
    async fn test_reject_event_sends_invalid_payload() {
        let (handle, _chats) = setup().await;
        let (id, mut socket) = connect(&handle, ANA).await;

        MessageDispatcher::reject_event(&handle, id, Some("fly-away".into()), "unknown".into())
            .await
            .unwrap();
        let message = socket.outbound.recv().await.unwrap();
        let data = message.d.unwrap();
        assert_eq!(data["code"], json!("INVALID_PAYLOAD"));
        assert_eq!(data["event"], json!("fly-away"));
    }
}
