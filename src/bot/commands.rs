//! Slash command handlers

use crate::store::{BatchStep, PendingInput};
use crate::telegram::TelegramError;

use super::texts;
use super::Bot;

impl Bot {
    pub(super) async fn handle_command(
        &self,
        user_id: i64,
        chat_id: i64,
        command: &str,
        args: &str,
    ) -> Result<(), TelegramError> {
        tracing::debug!(user_id, command, "Command received");
        let brand = &self.settings.brand_name;

        match command {
            "start" => {
                // Registers the user for /stats
                self.store.update(user_id, |_| ()).await;
                let premium = self.store.is_premium(user_id).await;
                self.reply(
                    chat_id,
                    &texts::welcome(premium, brand),
                    Some(texts::main_menu_keyboard()),
                )
                .await?;
            }
            "help" => {
                self.reply(chat_id, &texts::help_short(brand), None).await?;
            }
            "settings" => {
                let settings = self
                    .store
                    .update(user_id, |record| {
                        record.pending_input = Some(PendingInput::ChatIdDirect);
                        record.settings.clone()
                    })
                    .await;
                self.reply(
                    chat_id,
                    &texts::settings_command(&settings),
                    Some(texts::settings_keyboard(false)),
                )
                .await?;
            }
            "batch" => self.start_batch(user_id, chat_id).await?,
            "login" => self.start_login(user_id, chat_id).await?,
            "logout" => self.logout(user_id, chat_id).await?,
            "cancel" => {
                let removed = self.queue.cancel_user(user_id).await;
                let was_logging_in = self
                    .store
                    .update(user_id, |record| {
                        record.batch_step = None;
                        record.login_step.take().is_some()
                    })
                    .await;
                if was_logging_in {
                    if let Some(accounts) = &self.accounts {
                        accounts.abandon_login(user_id).await;
                    }
                }
                tracing::info!(user_id, removed, "Batch cancelled");
                self.reply(chat_id, &texts::cancelled(removed), None).await?;
            }
            "myplan" => {
                let premium = self.store.is_premium(user_id).await;
                self.reply(chat_id, &texts::my_plan(premium, &self.settings.limits), None)
                    .await?;
            }
            "plan" => {
                self.reply(chat_id, &texts::plans(&self.settings.limits), None)
                    .await?;
            }
            "add" | "rem" | "stats" if !self.store.is_owner(user_id) => {
                tracing::debug!(user_id, command, "Ignoring admin command from non-owner");
            }
            "add" => {
                let Ok(target) = args.parse::<i64>() else {
                    self.reply(chat_id, "❌ Usage: /add userID", None).await?;
                    return Ok(());
                };
                self.store.add_premium(target).await;
                tracing::info!(target, "Premium granted");
                self.reply(chat_id, &texts::premium_added(target), None).await?;
            }
            "rem" => {
                let Ok(target) = args.parse::<i64>() else {
                    self.reply(chat_id, "❌ Usage: /rem userID", None).await?;
                    return Ok(());
                };
                let text = if self.store.is_owner(target) {
                    texts::premium_owner_kept(target)
                } else {
                    self.store.remove_premium(target).await;
                    tracing::info!(target, "Premium revoked");
                    texts::premium_removed(target)
                };
                self.reply(chat_id, &text, None).await?;
            }
            "stats" => {
                let text = texts::stats(
                    self.store.user_count().await,
                    self.store.premium_count().await,
                    self.store.session_count().await,
                    self.queue.queued().await,
                    self.queue.active_count().await,
                );
                self.reply(chat_id, &text, None).await?;
            }
            _ => {
                tracing::debug!(user_id, command, "Unknown command");
            }
        }

        Ok(())
    }

    async fn start_batch(&self, user_id: i64, chat_id: i64) -> Result<(), TelegramError> {
        let has_target = self
            .store
            .update(user_id, |record| {
                if record.settings.chat_id.is_some() {
                    record.batch_step = Some(BatchStep::AwaitingLink);
                    record.pending_input = None;
                    true
                } else {
                    false
                }
            })
            .await;

        let text = if has_target {
            texts::ASK_START_LINK
        } else {
            texts::SET_TARGET_FIRST
        };
        self.reply(chat_id, text, None).await?;
        Ok(())
    }
}
