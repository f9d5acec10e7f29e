//! Per-batch outcome counters shared between workers and the batch monitor.

use std::sync::atomic::{AtomicUsize, Ordering};

use uuid::Uuid;

/// Where a batch's status message lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMessage {
    pub chat_id: i64,
    pub message_id: i32,
}

/// Outcome counters for one /batch run
#[derive(Debug)]
pub struct BatchProgress {
    pub id: Uuid,
    pub user_id: i64,
    pub total: usize,
    pub target_chat: i64,
    pub status: StatusMessage,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

/// Point-in-time copy of a batch's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCounts {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchCounts {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.succeeded + self.failed + self.cancelled >= self.total
    }
}

impl BatchProgress {
    pub fn new(user_id: i64, total: usize, target_chat: i64, status: StatusMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            total,
            target_chat,
            status,
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> BatchCounts {
        BatchCounts {
            total: self.total,
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}
