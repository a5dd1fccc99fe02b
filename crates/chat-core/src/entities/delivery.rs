//! Per-message delivery and read receipts
//!
//! Both maps only ever grow. The first timestamp recorded for a user wins and
//! is never overwritten, and reading a message implies it was delivered.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::value_objects::UserId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryRecord {
    delivered: BTreeMap<UserId, DateTime<Utc>>,
    read: BTreeMap<UserId, DateTime<Utc>>,
}

impl DeliveryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for a freshly created message: the sender has it and has read it.
    pub fn for_sender(sender: UserId, at: DateTime<Utc>) -> Self {
        let mut record = Self::new();
        record.mark_read(sender, at);
        record
    }

    /// Rebuild from persisted rows. A read entry without a delivered entry is
    /// completed with the read timestamp.
    pub fn from_entries(
        delivered: impl IntoIterator<Item = (UserId, DateTime<Utc>)>,
        read: impl IntoIterator<Item = (UserId, DateTime<Utc>)>,
    ) -> Self {
        let mut record = Self::new();
        for (user, at) in delivered {
            record.mark_delivered(user, at);
        }
        for (user, at) in read {
            record.mark_read(user, at);
        }
        record
    }

    /// Returns `true` when `user` was not yet in the delivered set.
    pub fn mark_delivered(&mut self, user: UserId, at: DateTime<Utc>) -> bool {
        if self.delivered.contains_key(&user) {
            return false;
        }
        self.delivered.insert(user, at);
        true
    }

    /// Returns `true` when `user` was not yet in the read set. Adds the
    /// delivered entry too if it is missing.
    pub fn mark_read(&mut self, user: UserId, at: DateTime<Utc>) -> bool {
        self.mark_delivered(user, at);
        if self.read.contains_key(&user) {
            return false;
        }
        self.read.insert(user, at);
        true
    }

    pub fn delivered_at(&self, user: UserId) -> Option<DateTime<Utc>> {
        self.delivered.get(&user).copied()
    }

    pub fn read_at(&self, user: UserId) -> Option<DateTime<Utc>> {
        self.read.get(&user).copied()
    }

    #[inline]
    pub fn is_delivered_to(&self, user: UserId) -> bool {
        self.delivered.contains_key(&user)
    }

    #[inline]
    pub fn is_read_by(&self, user: UserId) -> bool {
        self.read.contains_key(&user)
    }

    #[inline]
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    #[inline]
    pub fn read_count(&self) -> usize {
        self.read.len()
    }

    pub fn delivered(&self) -> impl Iterator<Item = (UserId, DateTime<Utc>)> + '_ {
        self.delivered.iter().map(|(u, at)| (*u, *at))
    }

    pub fn read(&self) -> impl Iterator<Item = (UserId, DateTime<Utc>)> + '_ {
        self.read.iter().map(|(u, at)| (*u, *at))
    }
}
