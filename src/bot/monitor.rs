//! Batch status monitor

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::instrument;

use crate::queue::{BatchProgress, RelayQueue};
use crate::telegram::TelegramApi;

use super::texts;

/// Keep a batch's status message current until every task is accounted for,
/// then replace it with the final summary. Stops without a summary on
/// shutdown.
#[instrument(
    name = "bot.monitor",
    skip_all,
    fields(batch_id = %batch.id, user_id = batch.user_id, total = batch.total)
)]
pub async fn monitor_batch(
    api: Arc<dyn TelegramApi>,
    queue: RelayQueue,
    batch: Arc<BatchProgress>,
    interval: Duration,
    brand: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let status = batch.status;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;
    let mut last_text = String::new();

    loop {
        if *shutdown.borrow() {
            tracing::debug!("Monitor stopped by shutdown");
            return;
        }
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!("Monitor stopped by shutdown");
                return;
            }
            _ = ticker.tick() => {}
        }

        let counts = batch.counts();
        if counts.is_complete() {
            break;
        }

        let active = queue.active_for_batch(batch.id).await;
        let queued = queue.queued_for(batch.user_id).await;
        let text = texts::batch_status(
            counts.processed(),
            counts.total,
            active.as_ref().and_then(|t| t.progress.as_deref()),
            queued,
            &brand,
        );
        if text == last_text {
            continue;
        }

        if let Err(e) = api
            .edit_message_text(status.chat_id, status.message_id, &text, None)
            .await
        {
            tracing::debug!(error = %e, "Failed to update batch status");
        }
        last_text = text;
    }

    let counts = batch.counts();
    tracing::info!(
        succeeded = counts.succeeded,
        failed = counts.failed,
        cancelled = counts.cancelled,
        "Batch finished"
    );
    let text = texts::batch_finished(&counts, batch.target_chat, &brand);
    if let Err(e) = api
        .edit_message_text(status.chat_id, status.message_id, &text, None)
        .await
    {
        tracing::warn!(error = %e, "Failed to write batch summary");
    }
}
