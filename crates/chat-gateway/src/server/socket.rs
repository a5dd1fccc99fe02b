//! WebSocket handler
//!
//! One task per socket: Hello, Identify, then a loop over inbound frames,
//! the outbound queue, the engine's kick signal and the heartbeat deadline.

use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use chat_core::UserId;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use crate::connection::{Connection, ConnectionId};
use crate::handlers::{
    HandlerError, HandlerResult, HeartbeatMonitor, IdentifyHandler, Inbound, MessageDispatcher,
};
use crate::protocol::{CloseCode, GatewayMessage, HelloPayload};
use crate::server::GatewayState;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// GET /gateway
pub async fn gateway_handler(
    State(state): State<GatewayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: GatewayState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let config = state.realtime().clone();

    let hello = GatewayMessage::hello(HelloPayload::with_interval(config.heartbeat_interval_ms));
    if send_frame(&mut sink, &hello).await.is_err() {
        tracing::debug!("Client went away before Hello");
        return;
    }

    let user_id = match identify(&state, &mut stream, config.identify_timeout()).await {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::info!(error = %e, "Identify failed");
            close(&mut sink, Some(e.close_code())).await;
            return;
        }
    };

    let id = ConnectionId::new();
    let (tx, outbound) = mpsc::channel(config.outbound_buffer);
    let (kick_tx, kick) = oneshot::channel();
    if let Err(e) = state
        .engine()
        .connect(Connection::new(id, user_id, tx, kick_tx))
        .await
    {
        tracing::error!(user_id = %user_id, error = %e, "Cannot register connection");
        close(&mut sink, Some(CloseCode::UnknownError)).await;
        return;
    }

    let span = tracing::info_span!("connection", connection_id = %id, user_id = %user_id);
    let outcome = run_connection(
        &state,
        id,
        user_id,
        &mut sink,
        &mut stream,
        outbound,
        kick,
        config.heartbeat_timeout(),
    )
    .instrument(span)
    .await;

    // Runs for every registered connection, whatever ended it.
    if let Err(e) = state.engine().disconnect(id).await {
        tracing::warn!(connection_id = %id, error = %e, "Disconnect not delivered");
    }
    close(&mut sink, outcome).await;
}

async fn identify(
    state: &GatewayState,
    stream: &mut WsStream,
    timeout: Duration,
) -> HandlerResult<UserId> {
    let message = tokio::time::timeout(timeout, first_frame(stream))
        .await
        .map_err(|_| HandlerError::Timeout("Identify"))??;
    IdentifyHandler::handle(
        &message,
        state.verifier(),
        state.service_context().user_repo(),
    )
    .await
}

async fn first_frame(stream: &mut WsStream) -> HandlerResult<GatewayMessage> {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => return Ok(GatewayMessage::decode(&text)?),
            Ok(Message::Binary(_)) => {
                return Err(HandlerError::InvalidPayload(
                    "binary frames are not supported".to_string(),
                ))
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(e) => return Err(HandlerError::Internal(e.to_string())),
        }
    }
    Err(HandlerError::NotAuthenticated)
}

/// Returns the close code to send, or `None` when the client is already gone.
#[allow(clippy::too_many_arguments)]
async fn run_connection(
    state: &GatewayState,
    id: ConnectionId,
    user_id: UserId,
    sink: &mut WsSink,
    stream: &mut WsStream,
    mut outbound: mpsc::Receiver<GatewayMessage>,
    mut kick: oneshot::Receiver<CloseCode>,
    heartbeat_timeout: Duration,
) -> Option<CloseCode> {
    let mut heartbeat = HeartbeatMonitor::new(heartbeat_timeout);

    loop {
        tokio::select! {
            biased;
            code = &mut kick => {
                let code = code.unwrap_or(CloseCode::UnknownError);
                tracing::info!(close_code = %code, "Closed by engine");
                return Some(code);
            }
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = send_frame(sink, &message).await {
                        tracing::debug!(error = %e, "Socket write failed");
                        return None;
                    }
                }
                // The engine let go of the connection.
                None => return Some(CloseCode::UnknownError),
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = handle_text(state, id, user_id, &mut heartbeat, sink, &text).await {
                        tracing::debug!(error = %e, "Closing connection");
                        return Some(e.close_code());
                    }
                }
                Some(Ok(Message::Binary(_))) => return Some(CloseCode::DecodeError),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("Client closed connection");
                    return None;
                }
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket error");
                    return None;
                }
            },
            () = tokio::time::sleep_until(heartbeat.deadline()) => {
                tracing::warn!("Connection timed out (no heartbeat)");
                return Some(CloseCode::SessionTimeout);
            }
        }
    }
}

async fn handle_text(
    state: &GatewayState,
    id: ConnectionId,
    user_id: UserId,
    heartbeat: &mut HeartbeatMonitor,
    sink: &mut WsSink,
    text: &str,
) -> HandlerResult<()> {
    let message = GatewayMessage::decode(text)?;
    match MessageDispatcher::classify(message)? {
        Inbound::Heartbeat => {
            heartbeat.record();
            send_frame(sink, &GatewayMessage::heartbeat_ack()).await
        }
        Inbound::Event(event) => {
            MessageDispatcher::dispatch_event(
                state.engine(),
                state.service_context().chat_directory(),
                id,
                user_id,
                event,
            )
            .await
        }
        Inbound::Invalid { event, reason } => {
            MessageDispatcher::reject_event(state.engine(), id, event, reason).await
        }
    }
}

async fn send_frame(sink: &mut WsSink, message: &GatewayMessage) -> HandlerResult<()> {
    let json = message
        .to_json()
        .map_err(|e| HandlerError::Internal(e.to_string()))?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| HandlerError::Internal(e.to_string()))
}

async fn close(sink: &mut WsSink, code: Option<CloseCode>) {
    // The peer may already be gone; nothing to do about a failed close.
    if let Some(code) = code {
        let frame = CloseFrame {
            code: code.as_u16(),
            reason: code.description().into(),
        };
        let _ = sink.send(Message::Close(Some(frame))).await;
    }
    let _ = sink.close().await;
}
