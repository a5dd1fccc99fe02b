//! Typing coordinator
//!
//! One entry per (chat, user) with a deadline. Deadlines sit in a min-heap;
//! refreshing bumps the entry's generation so the old heap item is skipped
//! when it surfaces.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use chat_core::{ChatId, UserId};
use tokio::time::Instant;

use crate::connection::ConnectionId;

type TypingKey = (ChatId, UserId);

#[derive(Debug, Clone)]
struct TypingEntry {
    /// Connection that last started or refreshed the signal
    origin: ConnectionId,
    generation: u64,
}

/// A signal that just ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingEnded {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub origin: ConnectionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingTransition {
    /// absent -> active; announce it
    Started,
    /// Deadline pushed back; stay quiet
    Refreshed,
}

#[derive(Debug)]
pub struct TypingCoordinator {
    timeout: Duration,
    active: HashMap<TypingKey, TypingEntry>,
    deadlines: BinaryHeap<Reverse<(Instant, u64, ChatId, UserId)>>,
    next_generation: u64,
}

impl TypingCoordinator {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            active: HashMap::new(),
            deadlines: BinaryHeap::new(),
            next_generation: 0,
        }
    }

    pub fn start(
        &mut self,
        chat_id: ChatId,
        user_id: UserId,
        origin: ConnectionId,
        now: Instant,
    ) -> TypingTransition {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.deadlines
            .push(Reverse((now + self.timeout, generation, chat_id, user_id)));

        let previous = self.active.insert(
            (chat_id, user_id),
            TypingEntry {
                origin,
                generation,
            },
        );
        if previous.is_some() {
            TypingTransition::Refreshed
        } else {
            TypingTransition::Started
        }
    }

    /// active -> absent. `None` when the pair was not typing.
    pub fn stop(&mut self, chat_id: ChatId, user_id: UserId) -> Option<TypingEnded> {
        self.active
            .remove(&(chat_id, user_id))
            .map(|entry| TypingEnded {
                chat_id,
                user_id,
                origin: entry.origin,
            })
    }

    /// Like [`stop`](Self::stop), but only when `origin` owns the signal.
    pub fn stop_from(
        &mut self,
        chat_id: ChatId,
        user_id: UserId,
        origin: ConnectionId,
    ) -> Option<TypingEnded> {
        let owned = self
            .active
            .get(&(chat_id, user_id))
            .is_some_and(|entry| entry.origin == origin);
        if owned {
            self.stop(chat_id, user_id)
        } else {
            None
        }
    }

    /// Remove and return every entry whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<TypingEnded> {
        let mut ended = Vec::new();
        while let Some(Reverse((deadline, generation, chat_id, user_id))) =
            self.deadlines.peek().copied()
        {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            let current = self
                .active
                .get(&(chat_id, user_id))
                .is_some_and(|entry| entry.generation == generation);
            if current {
                ended.extend(self.stop(chat_id, user_id));
            }
        }
        ended
    }

    /// Earliest live deadline. Drops stale heap items on the way.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, generation, chat_id, user_id))) =
            self.deadlines.peek().copied()
        {
            let live = self
                .active
                .get(&(chat_id, user_id))
                .is_some_and(|entry| entry.generation == generation);
            if live {
                return Some(deadline);
            }
            self.deadlines.pop();
        }
        None
    }

    /// Stop every signal last refreshed by `origin`.
    pub fn stop_all_from(&mut self, origin: ConnectionId) -> Vec<TypingEnded> {
        let mut keys: Vec<TypingKey> = self
            .active
            .iter()
            .filter(|(_, entry)| entry.origin == origin)
            .map(|(key, _)| *key)
            .collect();
        keys.sort_unstable();
        keys.into_iter()
            .filter_map(|(chat_id, user_id)| self.stop(chat_id, user_id))
            .collect()
    }

    pub fn is_typing(&self, chat_id: ChatId, user_id: UserId) -> bool {
        self.active.contains_key(&(chat_id, user_id))
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
