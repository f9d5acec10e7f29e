//! Relay task queue.
//!
//! Tasks flow from the /batch dialogue to the relay workers through an
//! `async_channel`. Channels cannot remove items, so cancellation works on a
//! per-user generation number: /cancel bumps the user's generation and
//! workers drop any task stamped with an older one. A ledger tracks how many
//! live tasks each user has queued so counts stay exact while stale tasks
//! drain.
//!
//! The queue also owns the table of transfers in progress, which feeds the
//! health endpoint and the batch status messages.

mod batch;
mod worker;

pub use batch::{BatchCounts, BatchProgress, StatusMessage};
pub use worker::RelayWorker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_channel::{Receiver, RecvError, Sender};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::relay::format_progress;
use crate::telegram::ChatRef;

/// One message to relay
#[derive(Debug, Clone)]
pub struct RelayTask {
    pub id: Uuid,
    pub user_id: i64,
    pub source: ChatRef,
    pub message_id: i32,
    pub target_chat: i64,
    pub batch: Arc<BatchProgress>,
    generation: u64,
}

/// A transfer currently being processed by a worker
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTransfer {
    pub user_id: i64,
    pub batch_id: Uuid,
    pub file_name: String,
    pub current: u64,
    pub total: u64,
    /// Bytes per second
    pub speed: f64,
    /// Rendered progress block, present once the first sample was taken
    pub progress: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is full: {queued} queued, {requested} requested, capacity {capacity}")]
    Full {
        queued: usize,
        requested: usize,
        capacity: usize,
    },
    #[error("Message ids overflow starting from {0}")]
    MessageIdOverflow(i32),
    #[error("Queue is closed")]
    Closed,
}

/// Live task counts and cancellation generations per user
#[derive(Debug, Default)]
struct Ledger {
    pending: HashMap<i64, usize>,
    generations: HashMap<i64, u64>,
    total: usize,
}

impl Ledger {
    fn generation(&self, user_id: i64) -> u64 {
        self.generations.get(&user_id).copied().unwrap_or(0)
    }
}

/// Shared relay queue, cloneable across the bot and workers
#[derive(Clone)]
pub struct RelayQueue {
    tx: Sender<RelayTask>,
    rx: Receiver<RelayTask>,
    capacity: usize,
    ledger: Arc<Mutex<Ledger>>,
    active: Arc<RwLock<HashMap<Uuid, ActiveTransfer>>>,
}

impl RelayQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            tx,
            rx,
            capacity,
            ledger: Arc::new(Mutex::new(Ledger::default())),
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Queue `batch.total` consecutive messages starting at `start_id`.
    ///
    /// All tasks are queued or none are.
    pub async fn enqueue_batch(
        &self,
        source: &ChatRef,
        start_id: i32,
        batch: Arc<BatchProgress>,
    ) -> Result<usize, QueueError> {
        let count = batch.total;
        let last_offset = i32::try_from(count.saturating_sub(1))
            .map_err(|_| QueueError::MessageIdOverflow(start_id))?;
        start_id
            .checked_add(last_offset)
            .ok_or(QueueError::MessageIdOverflow(start_id))?;

        let mut ledger = self.ledger.lock().await;
        if ledger.total + count > self.capacity {
            return Err(QueueError::Full {
                queued: ledger.total,
                requested: count,
                capacity: self.capacity,
            });
        }

        let generation = ledger.generation(batch.user_id);
        for offset in 0..count as i32 {
            let task = RelayTask {
                id: Uuid::new_v4(),
                user_id: batch.user_id,
                source: source.clone(),
                message_id: start_id + offset,
                target_chat: batch.target_chat,
                batch: Arc::clone(&batch),
                generation,
            };
            self.tx.try_send(task).map_err(|_| QueueError::Closed)?;
            *ledger.pending.entry(batch.user_id).or_default() += 1;
            ledger.total += 1;
        }

        tracing::info!(
            user_id = batch.user_id,
            batch_id = %batch.id,
            count,
            queued = ledger.total,
            "Batch queued"
        );
        Ok(count)
    }

    /// Receive the next task, live or stale
    pub async fn recv(&self) -> Result<RelayTask, RecvError> {
        self.rx.recv().await
    }

    /// Take ownership of a received task.
    ///
    /// Returns `false` if the task was cancelled after it was queued.
    pub async fn claim(&self, task: &RelayTask) -> bool {
        let mut ledger = self.ledger.lock().await;
        if task.generation != ledger.generation(task.user_id) {
            return false;
        }
        if let Some(pending) = ledger.pending.get_mut(&task.user_id) {
            *pending -= 1;
            if *pending == 0 {
                ledger.pending.remove(&task.user_id);
            }
        }
        ledger.total = ledger.total.saturating_sub(1);
        true
    }

    /// Drop every queued task of `user_id`. Returns how many were removed.
    pub async fn cancel_user(&self, user_id: i64) -> usize {
        let mut ledger = self.ledger.lock().await;
        let removed = ledger.pending.remove(&user_id).unwrap_or(0);
        ledger.total = ledger.total.saturating_sub(removed);
        *ledger.generations.entry(user_id).or_default() += 1;
        removed
    }

    /// Number of live queued tasks across all users
    pub async fn queued(&self) -> usize {
        self.ledger.lock().await.total
    }

    /// Number of live queued tasks for one user
    pub async fn queued_for(&self, user_id: i64) -> usize {
        self.ledger
            .lock()
            .await
            .pending
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// The transfer currently running for a batch, if any
    pub async fn active_for_batch(&self, batch_id: Uuid) -> Option<ActiveTransfer> {
        self.active
            .read()
            .await
            .values()
            .find(|t| t.batch_id == batch_id)
            .cloned()
    }

    async fn begin_transfer(&self, task: &RelayTask) {
        self.active.write().await.insert(
            task.id,
            ActiveTransfer {
                user_id: task.user_id,
                batch_id: task.batch.id,
                file_name: format!("file_{}", task.message_id),
                current: 0,
                total: 0,
                speed: 0.0,
                progress: None,
            },
        );
    }

    async fn end_transfer(&self, task_id: Uuid) {
        self.active.write().await.remove(&task_id);
    }

    /// Stop accepting tasks; workers exit once the channel drains
    pub fn close(&self) {
        self.tx.close();
    }
}

/// Progress reporting handle given to the relay for one transfer.
///
/// Samples are throttled to one per `interval`, except the final one.
pub struct TransferHandle {
    queue: RelayQueue,
    task_id: Uuid,
    started: Instant,
    interval: Duration,
    last_sample: Mutex<Option<Instant>>,
}

impl TransferHandle {
    pub fn new(queue: RelayQueue, task_id: Uuid, interval: Duration) -> Self {
        Self {
            queue,
            task_id,
            started: Instant::now(),
            interval,
            last_sample: Mutex::new(None),
        }
    }

    /// Record the resolved file name and size
    pub async fn describe(&self, file_name: &str, total: u64) {
        if let Some(transfer) = self.queue.active.write().await.get_mut(&self.task_id) {
            transfer.file_name = file_name.to_string();
            transfer.total = total;
        }
    }

    /// Record that `current` of `total` bytes have been transferred
    pub async fn record(&self, current: u64, total: u64) {
        let now = Instant::now();
        {
            let mut last = self.last_sample.lock().await;
            let due = last.map_or(true, |at| now.duration_since(at) >= self.interval);
            if !due && current < total {
                return;
            }
            *last = Some(now);
        }

        let elapsed = now.duration_since(self.started).as_secs_f64();
        let speed = if elapsed > 0.0 {
            current as f64 / elapsed
        } else {
            1.0
        };
        let progress = format_progress(current, total, speed);

        if let Some(transfer) = self.queue.active.write().await.get_mut(&self.task_id) {
            transfer.current = current;
            transfer.total = total;
            transfer.speed = speed;
            transfer.progress = Some(progress);
        }
    }
}
