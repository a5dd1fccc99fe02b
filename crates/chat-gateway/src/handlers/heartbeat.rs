//! Heartbeat (op 1) bookkeeping

use std::time::Duration;

use tokio::time::Instant;

/// Tracks when a connection must next be heard from.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatMonitor {
    timeout: Duration,
    deadline: Instant,
}

impl HeartbeatMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    /// Client sent a heartbeat; push the deadline back.
    pub fn record(&mut self) {
        self.deadline = Instant::now() + self.timeout;
        tracing::trace!("Heartbeat received");
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}
