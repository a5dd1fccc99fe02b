//! Delivery-state machine
//!
//! Receipt writes run off the engine task. The [`WriteQueue`] keeps at most
//! one write per message in flight, so a second receipt for a message never
//! starts (or broadcasts) before the first one has committed. Reads recorded
//! by a REST request go through the same queue.

use std::collections::{HashMap, HashSet, VecDeque};

use chat_core::{ChatId, DeliveryUpdate, DomainError, MessageId, MessageStore, UserId};
use chrono::{DateTime, Utc};

use crate::connection::ConnectionId;
use crate::events::ServerEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteKind {
    Delivered { message_id: MessageId },
    Read { chat_id: ChatId, message_ids: Vec<MessageId> },
}

/// One receipt write, tagged with the connection that asked for it. `origin`
/// is `None` for writes requested outside a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteJob {
    pub id: u64,
    pub origin: Option<ConnectionId>,
    pub user_id: UserId,
    pub kind: WriteKind,
    pub at: DateTime<Utc>,
}

impl WriteJob {
    pub fn message_ids(&self) -> &[MessageId] {
        match &self.kind {
            WriteKind::Delivered { message_id } => std::slice::from_ref(message_id),
            WriteKind::Read { message_ids, .. } => message_ids,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self.kind {
            WriteKind::Delivered { .. } => "mark-delivered",
            WriteKind::Read { .. } => "mark-read",
        }
    }

    /// Run the write against the store.
    #[tracing::instrument(skip(self, store), fields(job = self.id, user_id = %self.user_id))]
    pub async fn execute(self, store: &dyn MessageStore) -> WriteCompletion {
        let result = match &self.kind {
            WriteKind::Delivered { message_id } => store
                .record_delivered(*message_id, self.user_id, self.at)
                .await
                .map(WriteOutcome::Delivered),
            WriteKind::Read {
                chat_id,
                message_ids,
            } => store
                .record_read(*chat_id, message_ids, self.user_id, self.at)
                .await
                .map(WriteOutcome::Read),
        };
        WriteCompletion { job: self, result }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Delivered(DeliveryUpdate),
    /// Ids whose read set grew
    Read(Vec<MessageId>),
}

#[derive(Debug)]
pub struct WriteCompletion {
    pub job: WriteJob,
    pub result: Result<WriteOutcome, DomainError>,
}

/// Admission control keyed by message id
#[derive(Debug, Default)]
pub struct WriteQueue {
    in_flight: HashSet<MessageId>,
    waiting: VecDeque<WriteJob>,
    /// Number of waiting jobs that touch each message
    claims: HashMap<MessageId, usize>,
}

impl WriteQueue {
    fn conflicts(ids: &[MessageId], busy: &HashSet<MessageId>) -> bool {
        ids.iter().any(|id| busy.contains(id))
    }

    /// Returns the job when it may start now; otherwise it waits its turn.
    pub fn submit(&mut self, job: WriteJob) -> Option<WriteJob> {
        let ids = job.message_ids();
        let claimed = ids.iter().any(|id| self.claims.contains_key(id));
        if claimed || Self::conflicts(ids, &self.in_flight) {
            for id in ids {
                *self.claims.entry(*id).or_default() += 1;
            }
            self.waiting.push_back(job);
            return None;
        }
        self.in_flight.extend(ids.iter().copied());
        Some(job)
    }

    /// Release the ids of a finished job and admit whatever can start now,
    /// in submission order.
    pub fn complete(&mut self, job: &WriteJob) -> Vec<WriteJob> {
        for id in job.message_ids() {
            self.in_flight.remove(id);
        }
        if self.waiting.is_empty() {
            return Vec::new();
        }

        let mut admitted = Vec::new();
        // Ids claimed by an earlier job still waiting; later jobs may not pass it.
        let mut blocked: HashSet<MessageId> = HashSet::new();
        let mut still_waiting = VecDeque::with_capacity(self.waiting.len());
        for queued in self.waiting.drain(..) {
            let ids = queued.message_ids();
            if Self::conflicts(ids, &self.in_flight) || Self::conflicts(ids, &blocked) {
                blocked.extend(ids.iter().copied());
                still_waiting.push_back(queued);
            } else {
                self.in_flight.extend(ids.iter().copied());
                for id in ids {
                    if let Some(count) = self.claims.get_mut(id) {
                        *count -= 1;
                        if *count == 0 {
                            self.claims.remove(id);
                        }
                    }
                }
                admitted.push(queued);
            }
        }
        self.waiting = still_waiting;
        admitted
    }

    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }
}

/// What the engine should do with a finished write
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEffect {
    Broadcast {
        chat_id: ChatId,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    },
    ReportError {
        connection: ConnectionId,
        event: ServerEvent,
    },
    Nothing,
}

#[derive(Debug, Default)]
pub struct DeliveryStateMachine {
    queue: WriteQueue,
    next_job: u64,
    /// Delivery marks queued or running, per reader and message
    pending_delivered: HashSet<(UserId, MessageId)>,
}

impl DeliveryStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn job(
        &mut self,
        origin: Option<ConnectionId>,
        user_id: UserId,
        kind: WriteKind,
        at: DateTime<Utc>,
    ) -> WriteJob {
        self.next_job += 1;
        WriteJob {
            id: self.next_job,
            origin,
            user_id,
            kind,
            at,
        }
    }

    /// Returns the job to start now, if it is not queued behind another.
    /// A repeat of a mark that has not finished yet is dropped.
    pub fn mark_delivered(
        &mut self,
        origin: ConnectionId,
        user_id: UserId,
        message_id: MessageId,
        at: DateTime<Utc>,
    ) -> Option<WriteJob> {
        if !self.pending_delivered.insert((user_id, message_id)) {
            tracing::debug!(user_id = %user_id, message_id = %message_id, "Delivery mark already pending");
            return None;
        }
        let job = self.job(Some(origin), user_id, WriteKind::Delivered { message_id }, at);
        self.queue.submit(job)
    }

    /// Duplicate ids are collapsed. An empty batch writes nothing.
    pub fn mark_read(
        &mut self,
        origin: ConnectionId,
        user_id: UserId,
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
        at: DateTime<Utc>,
    ) -> Option<WriteJob> {
        let job = self.read_job(Some(origin), user_id, chat_id, message_ids, at)?;
        self.queue.submit(job)
    }

    /// Build a read job without submitting it; `None` for an empty batch.
    pub fn read_job(
        &mut self,
        origin: Option<ConnectionId>,
        user_id: UserId,
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
        at: DateTime<Utc>,
    ) -> Option<WriteJob> {
        let mut seen = HashSet::new();
        let message_ids: Vec<MessageId> = message_ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();
        if message_ids.is_empty() {
            return None;
        }
        Some(self.job(
            origin,
            user_id,
            WriteKind::Read {
                chat_id,
                message_ids,
            },
            at,
        ))
    }

    /// Queue a job built by [`Self::read_job`]; returns it when it may start now.
    pub fn submit(&mut self, job: WriteJob) -> Option<WriteJob> {
        self.queue.submit(job)
    }

    /// Turn a finished write into its effect, plus the jobs it unblocked.
    pub fn complete(&mut self, completion: WriteCompletion) -> (DeliveryEffect, Vec<WriteJob>) {
        let WriteCompletion { job, result } = completion;
        let next = self.queue.complete(&job);
        if let WriteKind::Delivered { message_id } = &job.kind {
            self.pending_delivered.remove(&(job.user_id, *message_id));
        }

        let effect = match (result, &job.kind) {
            (Ok(WriteOutcome::Delivered(update)), WriteKind::Delivered { message_id }) => {
                if update.newly_delivered {
                    DeliveryEffect::Broadcast {
                        chat_id: update.chat_id,
                        event: ServerEvent::MessageDelivered {
                            message_id: *message_id,
                            chat_id: update.chat_id,
                            user_id: job.user_id,
                            delivered_at: update.delivered_at,
                        },
                        exclude: job.origin,
                    }
                } else {
                    DeliveryEffect::Nothing
                }
            }
            (Ok(WriteOutcome::Read(newly_read)), WriteKind::Read { chat_id, .. }) => {
                if newly_read.is_empty() {
                    DeliveryEffect::Nothing
                } else {
                    DeliveryEffect::Broadcast {
                        chat_id: *chat_id,
                        event: ServerEvent::MessagesRead {
                            chat_id: *chat_id,
                            user_id: job.user_id,
                            message_ids: newly_read,
                            read_at: job.at,
                        },
                        exclude: job.origin,
                    }
                }
            }
            (Ok(_), _) => DeliveryEffect::Nothing,
            (Err(e), _) if e.is_not_found() => {
                tracing::debug!(job = job.id, error = %e, "Receipt for unknown message ignored");
                DeliveryEffect::Nothing
            }
            (Err(e), _) => {
                tracing::warn!(job = job.id, user_id = %job.user_id, error = %e, "Receipt write failed");
                match job.origin {
                    Some(connection) => {
                        let code = if e.is_store_unavailable() {
                            "STORE_UNAVAILABLE"
                        } else {
                            e.code()
                        };
                        DeliveryEffect::ReportError {
                            connection,
                            event: ServerEvent::Error {
                                code: code.to_string(),
                                message: e.to_string(),
                                event: Some(job.event_name().to_string()),
                                message_ids: Some(job.message_ids().to_vec()),
                            },
                        }
                    }
                    // The requester gets the error through its own reply.
                    None => DeliveryEffect::Nothing,
                }
            }
        };

        (effect, next)
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }
}
