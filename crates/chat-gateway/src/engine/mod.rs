//! Real-time engine
//!
//! One task owns all in-memory real-time state ([`RealtimeCore`]) and works
//! through an ordered command stream. Connection tasks and the REST layer
//! talk to it through a cloneable [`GatewayHandle`].
//!
//! Receipt writes are spawned off the engine task and their completions
//! re-enter the loop through their own channel. Presence flips go to a single
//! writer task so they are persisted in the order they happened.

mod delivery;
mod presence;
mod realtime;
mod rooms;
mod typing;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_core::{ChatId, DomainError, MessageId, MessageStore, UserId, UserRepository};
use chat_service::dto::MessageResponse;
use chat_service::RealtimeNotifier;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub use realtime::{Effects, Now, PresenceChange, ReadReply, RealtimeCore};
pub use delivery::{
    DeliveryEffect, DeliveryStateMachine, WriteCompletion, WriteJob, WriteKind, WriteOutcome,
    WriteQueue,
};
pub use presence::{PresenceSnapshot, PresenceTracker};
pub use rooms::RoomMembership;
pub use typing::{TypingCoordinator, TypingEnded, TypingTransition};

use crate::connection::{Connection, ConnectionId};
use crate::events::{ClientEvent, ServerEvent};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Real-time engine has stopped")]
    Stopped,
}

pub enum Command {
    Connect(Connection),
    Disconnect(ConnectionId),
    Event(ConnectionId, ClientEvent),
    Publish {
        chat_id: ChatId,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    },
    Send(ConnectionId, ServerEvent),
    MarkRead {
        user_id: UserId,
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
        read_at: DateTime<Utc>,
        reply: ReadReply,
    },
    Presence {
        user_id: UserId,
        reply: oneshot::Sender<PresenceSnapshot>,
    },
    Shutdown,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Disconnect(_) => "disconnect",
            Self::Event(..) => "event",
            Self::Publish { .. } => "publish",
            Self::Send(..) => "send",
            Self::MarkRead { .. } => "mark-read",
            Self::Presence { .. } => "presence",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub typing_timeout: Duration,
    /// Command queue capacity
    pub buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            typing_timeout: Duration::from_secs(5),
            buffer: 4096,
        }
    }
}

pub struct Engine {
    core: RealtimeCore,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<WriteCompletion>,
    completions: mpsc::UnboundedReceiver<WriteCompletion>,
    message_store: Arc<dyn MessageStore>,
    user_repo: Arc<dyn UserRepository>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        message_store: Arc<dyn MessageStore>,
        user_repo: Arc<dyn UserRepository>,
    ) -> (Self, GatewayHandle) {
        let (tx, commands) = mpsc::channel(config.buffer.max(1));
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let engine = Self {
            core: RealtimeCore::new(config.typing_timeout),
            commands,
            completions_tx,
            completions,
            message_store,
            user_repo,
        };
        (engine, GatewayHandle { commands: tx })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until `Shutdown` or until every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!("Real-time engine started");
        let presence_writer = spawn_presence_writer(Arc::clone(&self.user_repo));
        loop {
            let deadline = self.core.next_typing_deadline();
            let effects = tokio::select! {
                biased;
                Some(completion) = self.completions.recv() => {
                    self.core.complete_write(completion, Now::current())
                }
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle(command),
                },
                () = sleep_until(deadline) => self.core.expire_typing(Now::current()),
            };
            self.apply(effects, &presence_writer);
        }
        tracing::info!(
            connections = self.core.registry().len(),
            "Real-time engine stopped"
        );
    }

    fn handle(&mut self, command: Command) -> Effects {
        let now = Now::current();
        match command {
            Command::Connect(connection) => self.core.connect(connection, now),
            Command::Disconnect(id) => self.core.disconnect(id, now),
            Command::Event(id, event) => self.core.handle_event(id, event, now),
            Command::Publish {
                chat_id,
                event,
                exclude,
            } => self.core.publish(chat_id, &event, exclude, now),
            Command::Send(id, event) => self.core.send(id, &event, now),
            Command::MarkRead {
                user_id,
                chat_id,
                message_ids,
                read_at,
                reply,
            } => self
                .core
                .mark_read_for_request(user_id, chat_id, message_ids, read_at, reply),
            Command::Presence { user_id, reply } => {
                // The asker may have given up.
                let _ = reply.send(self.core.presence_of(user_id));
                Effects::default()
            }
            Command::Shutdown => Effects::default(),
        }
    }

    fn apply(&self, effects: Effects, presence_writer: &mpsc::UnboundedSender<PresenceChange>) {
        for job in effects.writes {
            let store = Arc::clone(&self.message_store);
            let completions = self.completions_tx.clone();
            tokio::spawn(async move {
                let completion = job.execute(store.as_ref()).await;
                // Only fails once the engine is gone.
                let _ = completions.send(completion);
            });
        }

        for change in effects.presence {
            if presence_writer.send(change).is_err() {
                tracing::warn!(user_id = %change.user_id, "Presence writer is gone");
            }
        }
    }
}

/// Persist presence flips one at a time, in order. Stops when the engine drops
/// its sender.
fn spawn_presence_writer(
    user_repo: Arc<dyn UserRepository>,
) -> mpsc::UnboundedSender<PresenceChange> {
    let (tx, mut rx) = mpsc::unbounded_channel::<PresenceChange>();
    tokio::spawn(async move {
        while let Some(change) = rx.recv().await {
            if let Err(e) = user_repo
                .record_presence(change.user_id, change.online, change.at)
                .await
            {
                tracing::warn!(
                    user_id = %change.user_id,
                    online = change.online,
                    error = %e,
                    "Failed to persist presence"
                );
            }
        }
    });
    tx
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable sender side of the engine
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    commands: mpsc::Sender<Command>,
}

impl GatewayHandle {
    async fn send_command(&self, command: Command) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::Stopped)
    }

    pub async fn connect(&self, connection: Connection) -> Result<(), EngineError> {
        self.send_command(Command::Connect(connection)).await
    }

    pub async fn disconnect(&self, id: ConnectionId) -> Result<(), EngineError> {
        self.send_command(Command::Disconnect(id)).await
    }

    pub async fn event(&self, id: ConnectionId, event: ClientEvent) -> Result<(), EngineError> {
        self.send_command(Command::Event(id, event)).await
    }

    pub async fn publish(
        &self,
        chat_id: ChatId,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> Result<(), EngineError> {
        self.send_command(Command::Publish {
            chat_id,
            event,
            exclude,
        })
        .await
    }

    /// Dispatch to one connection.
    pub async fn send(&self, id: ConnectionId, event: ServerEvent) -> Result<(), EngineError> {
        self.send_command(Command::Send(id, event)).await
    }

    /// Record reads outside a connection, in turn with pending receipts for
    /// the same messages. Resolves to the ids whose read set grew.
    pub async fn record_read(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
        read_at: DateTime<Utc>,
    ) -> Result<Result<Vec<MessageId>, DomainError>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::MarkRead {
            user_id,
            chat_id,
            message_ids,
            read_at,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    pub async fn presence(&self, user_id: UserId) -> Result<PresenceSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Presence { user_id, reply }).await?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.send_command(Command::Shutdown).await
    }

    async fn publish_or_warn(&self, chat_id: ChatId, event: ServerEvent) {
        let name = event.name();
        if let Err(e) = self.publish(chat_id, event, None).await {
            tracing::warn!(chat_id = %chat_id, event = name, error = %e, "Dropped realtime event");
        }
    }
}

#[async_trait]
impl RealtimeNotifier for GatewayHandle {
    async fn message_created(&self, message: &MessageResponse) {
        self.publish_or_warn(message.chat_id, ServerEvent::NewMessage(message.clone()))
            .await;
    }

    async fn mark_read(
        &self,
        chat_id: ChatId,
        reader: UserId,
        message_ids: Vec<MessageId>,
        read_at: DateTime<Utc>,
    ) -> Option<Result<Vec<MessageId>, DomainError>> {
        match self.record_read(reader, chat_id, message_ids, read_at).await {
            Ok(answer) => Some(answer),
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, user_id = %reader, error = %e, "Read not sequenced by engine");
                None
            }
        }
    }

    async fn message_deleted(&self, chat_id: ChatId, message_id: MessageId) {
        self.publish_or_warn(chat_id, ServerEvent::MessageDeleted { chat_id, message_id })
            .await;
    }

    async fn is_online(&self, user_id: UserId) -> bool {
        match self.presence(user_id).await {
            Ok(snapshot) => snapshot.online,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Presence query failed");
                false
            }
        }
    }
}
