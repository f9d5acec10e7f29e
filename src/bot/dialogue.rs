//! Free-text dialogue: a login in progress first, then settings input, then
//! the /batch steps

use std::sync::Arc;

use crate::config::THUMBNAIL_MAX_EDGE;
use crate::queue::{BatchProgress, QueueError, StatusMessage};
use crate::relay::parse_link;
use crate::store::{BatchStep, PendingInput, UserSettings};
use crate::telegram::{ChatRef, PhotoSize, TelegramError};

use super::monitor::monitor_batch;
use super::texts;
use super::Bot;

/// Outcome of applying one line of settings input
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum InputOutcome {
    /// Stored; input is no longer pending
    Saved(String),
    /// Rejected; keep waiting for the same input
    Rejected(&'static str),
}

/// Apply `text` as the answer to `input`
pub(crate) fn apply_input(
    settings: &mut UserSettings,
    input: PendingInput,
    text: &str,
) -> InputOutcome {
    match input {
        PendingInput::ChatId | PendingInput::ChatIdDirect => match text.parse::<i64>() {
            Ok(chat_id) => {
                settings.chat_id = Some(chat_id);
                if input == PendingInput::ChatIdDirect {
                    InputOutcome::Saved(texts::chat_id_set_direct(chat_id))
                } else {
                    InputOutcome::Saved(texts::chat_id_set(chat_id))
                }
            }
            Err(_) if input == PendingInput::ChatIdDirect => {
                InputOutcome::Rejected(texts::INVALID_CHAT_ID_DIRECT)
            }
            Err(_) => InputOutcome::Rejected(texts::INVALID_CHAT_ID),
        },
        PendingInput::Rename => {
            settings.rename = Some(text.to_string());
            InputOutcome::Saved(texts::rename_set(text))
        }
        PendingInput::Caption => {
            settings.caption = Some(text.to_string());
            InputOutcome::Saved(texts::CAPTION_SET.to_string())
        }
        PendingInput::Thumbnail => InputOutcome::Rejected(texts::THUMBNAIL_EXPECTED),
        PendingInput::ReplaceRule => {
            let Some((old, new)) = text.split_once('|') else {
                return InputOutcome::Rejected(texts::REPLACE_FORMAT);
            };
            let (old, new) = (old.trim(), new.trim());
            if old.is_empty() {
                return InputOutcome::Rejected(texts::REPLACE_FORMAT);
            }
            settings.upsert_replace(old.to_string(), new.to_string());
            InputOutcome::Saved(texts::replace_rule_added(old, new))
        }
        PendingInput::RemoveWords => {
            let words: Vec<String> = text
                .split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(str::to_string)
                .collect();
            let count = words.len();
            settings.remove_words.extend(words);
            InputOutcome::Saved(texts::remove_words_added(count))
        }
    }
}

/// Photo size to use as thumbnail: the largest that fits within the
/// thumbnail edge limit, or the smallest if none does
pub(crate) fn select_thumbnail(sizes: &[PhotoSize]) -> Option<&PhotoSize> {
    let area = |p: &&PhotoSize| u64::from(p.width) * u64::from(p.height);
    sizes
        .iter()
        .filter(|p| p.width <= THUMBNAIL_MAX_EDGE && p.height <= THUMBNAIL_MAX_EDGE)
        .max_by_key(area)
        .or_else(|| sizes.iter().min_by_key(area))
}

impl Bot {
    pub(super) async fn handle_photo(
        &self,
        user_id: i64,
        chat_id: i64,
        sizes: &[PhotoSize],
    ) -> Result<(), TelegramError> {
        let Some(best) = select_thumbnail(sizes) else {
            return Ok(());
        };
        let file_id = best.file_id.clone();

        let stored = self
            .store
            .update(user_id, |record| {
                if record.pending_input != Some(PendingInput::Thumbnail) {
                    return false;
                }
                record.settings.thumbnail = Some(file_id);
                record.pending_input = None;
                true
            })
            .await;

        if stored {
            tracing::info!(user_id, width = best.width, height = best.height, "Thumbnail set");
            self.reply(chat_id, texts::THUMBNAIL_SET, None).await?;
        }
        Ok(())
    }

    pub(super) async fn handle_text(
        &self,
        user_id: i64,
        chat_id: i64,
        text: &str,
    ) -> Result<(), TelegramError> {
        let record = self.store.user(user_id).await;

        if let Some(step) = record.login_step {
            return self.handle_login_input(user_id, chat_id, step, text).await;
        }

        if let Some(input) = record.pending_input {
            let outcome = self
                .store
                .update(user_id, |record| {
                    let outcome = apply_input(&mut record.settings, input, text);
                    if matches!(outcome, InputOutcome::Saved(_)) {
                        record.pending_input = None;
                    }
                    outcome
                })
                .await;
            let reply = match outcome {
                InputOutcome::Saved(reply) => {
                    tracing::info!(user_id, input = ?input, "Setting updated");
                    reply
                }
                InputOutcome::Rejected(reply) => reply.to_string(),
            };
            self.reply(chat_id, &reply, None).await?;
            return Ok(());
        }

        match record.batch_step {
            Some(BatchStep::AwaitingLink) => self.batch_link(user_id, chat_id, text).await,
            Some(BatchStep::AwaitingCount { source, start_id }) => {
                self.batch_count(user_id, chat_id, text, source, start_id)
                    .await
            }
            None => Ok(()),
        }
    }

    async fn batch_link(&self, user_id: i64, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let Some((source, start_id)) = parse_link(text) else {
            self.reply(chat_id, texts::INVALID_LINK, None).await?;
            return Ok(());
        };

        self.store
            .update(user_id, |record| {
                record.batch_step = Some(BatchStep::AwaitingCount { source, start_id });
            })
            .await;

        let premium = self.store.is_premium(user_id).await;
        let limit = self.settings.limits.batch_limit(premium);
        self.reply(chat_id, &texts::ask_count(limit), None).await?;
        Ok(())
    }

    async fn batch_count(
        &self,
        user_id: i64,
        chat_id: i64,
        text: &str,
        source: ChatRef,
        start_id: i32,
    ) -> Result<(), TelegramError> {
        let count = match text.parse::<i64>() {
            Ok(count) if count >= 1 => count,
            _ => {
                self.reply(chat_id, texts::INVALID_NUMBER, None).await?;
                return Ok(());
            }
        };

        let premium = self.store.is_premium(user_id).await;
        let limit = self.settings.limits.batch_limit(premium);
        if count > i64::from(limit) {
            self.reply(chat_id, &texts::over_limit(limit), None).await?;
            return Ok(());
        }

        let target = self
            .store
            .update(user_id, |record| {
                record.batch_step = None;
                record.settings.chat_id
            })
            .await;
        let Some(target_chat) = target else {
            self.reply(chat_id, texts::SET_TARGET_FIRST, None).await?;
            return Ok(());
        };

        let brand = &self.settings.brand_name;
        // count <= limit, which is a u32
        let total = count as usize;
        let status = self
            .reply(
                chat_id,
                &texts::batch_status(0, total, None, total, brand),
                None,
            )
            .await?;
        let status = StatusMessage {
            chat_id,
            message_id: status.message_id,
        };

        let batch = Arc::new(BatchProgress::new(user_id, total, target_chat, status));
        match self
            .queue
            .enqueue_batch(&source, start_id, Arc::clone(&batch))
            .await
        {
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Batch rejected");
                let text = match e {
                    QueueError::Full { .. } | QueueError::Closed => texts::queue_full(brand),
                    QueueError::MessageIdOverflow(_) => texts::INVALID_LINK.to_string(),
                };
                self.api
                    .edit_message_text(status.chat_id, status.message_id, &text, None)
                    .await?;
                return Ok(());
            }
        }

        tokio::spawn(monitor_batch(
            Arc::clone(&self.api),
            self.queue.clone(),
            batch,
            self.settings.monitor_interval,
            brand.clone(),
            self.shutdown.clone(),
        ));
        Ok(())
    }
}
