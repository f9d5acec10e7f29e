//! Relay worker that processes tasks from the shared queue
//!
//! Each worker takes one task at a time, skips tasks cancelled after they
//! were queued, runs the transfer and records the outcome on the task's
//! batch. Failures are logged and never stop the worker; only shutdown or a
//! closed queue does. The pause between tasks only follows real transfers,
//! so a cancelled batch drains at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::instrument;

use crate::relay::Relay;

use super::{RelayQueue, RelayTask, TransferHandle};

/// Worker pulling relay tasks from the queue
pub struct RelayWorker {
    id: usize,
    queue: RelayQueue,
    relay: Arc<Relay>,
    /// Pause after each task
    task_delay: Duration,
    /// Minimum spacing between progress samples
    progress_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl RelayWorker {
    pub fn new(
        id: usize,
        queue: RelayQueue,
        relay: Arc<Relay>,
        task_delay: Duration,
        progress_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            queue,
            relay,
            task_delay,
            progress_interval,
            shutdown,
        }
    }

    /// Run the worker loop until shutdown or until the queue closes
    #[instrument(name = "relay.worker", skip(self), fields(worker_id = self.id))]
    pub async fn run(mut self) {
        tracing::info!("Worker started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let task = tokio::select! {
                biased;

                _ = self.shutdown.changed() => break,
                task = self.queue.recv() => match task {
                    Ok(task) => task,
                    Err(_) => break,
                },
            };

            if !self.process(task).await {
                continue;
            }

            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = tokio::time::sleep(self.task_delay) => {}
            }
        }

        tracing::info!("Worker stopped");
    }

    /// Run one task. Returns false if it was cancelled and skipped.
    async fn process(&self, task: RelayTask) -> bool {
        if !self.queue.claim(&task).await {
            tracing::debug!(task_id = %task.id, "Skipping cancelled task");
            task.batch.record_cancelled();
            return false;
        }

        tracing::info!(
            task_id = %task.id,
            user_id = task.user_id,
            chat = %task.source,
            message_id = task.message_id,
            "Processing task"
        );

        self.queue.begin_transfer(&task).await;
        let handle = TransferHandle::new(self.queue.clone(), task.id, self.progress_interval);
        let result = self.relay.transfer(&task, &handle).await;
        self.queue.end_transfer(task.id).await;

        match result {
            Ok(report) => {
                tracing::info!(
                    task_id = %task.id,
                    file_name = %report.file_name,
                    delivery = ?report.delivery,
                    "Task completed"
                );
                task.batch.record_success();
            }
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "Task failed");
                task.batch.record_failure();
            }
        }
        true
    }
}
