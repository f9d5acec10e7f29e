//! Bot front end: long-polls updates and drives commands, buttons and the
//! login, settings and /batch dialogues.
//!
//! Updates are handled one at a time in arrival order. The only work that
//! outlives an update is the batch monitor, which runs as its own task.

mod callbacks;
mod commands;
mod dialogue;
mod login;
mod monitor;
pub mod texts;

pub use monitor::monitor_batch;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::instrument;

use crate::account::AccountApi;
use crate::config::{AppConfig, LimitsConfig, POLL_RETRY_DELAY_SECS};
use crate::queue::RelayQueue;
use crate::store::Store;
use crate::telegram::{
    BotCommand, InlineKeyboardMarkup, Message, TelegramApi, TelegramError, Update,
};

/// Bot behaviour that comes from configuration
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub brand_name: String,
    pub limits: LimitsConfig,
    pub poll_timeout: Duration,
    pub monitor_interval: Duration,
}

impl BotSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            brand_name: config.bot.brand_name.clone(),
            limits: config.limits.clone(),
            poll_timeout: Duration::from_secs(config.telegram.poll_timeout_seconds),
            monitor_interval: Duration::from_secs(config.queue.monitor_interval_seconds),
        }
    }
}

/// Update dispatcher
pub struct Bot {
    api: Arc<dyn TelegramApi>,
    store: Arc<Store>,
    queue: RelayQueue,
    /// Account login, absent when no API credentials are configured
    accounts: Option<Arc<dyn AccountApi>>,
    settings: BotSettings,
    shutdown: watch::Receiver<bool>,
}

/// Split `/command@bot args` into the lowercased command word and its arguments
pub(crate) fn parse_command(text: &str) -> Option<(String, &str)> {
    let rest = text.strip_prefix('/')?;
    let (word, args) = match rest.split_once(char::is_whitespace) {
        Some((word, args)) => (word, args.trim()),
        None => (rest, ""),
    };
    let command = word.split('@').next().unwrap_or(word);
    if command.is_empty() {
        return None;
    }
    Some((command.to_ascii_lowercase(), args))
}

impl Bot {
    pub fn new(
        api: Arc<dyn TelegramApi>,
        store: Arc<Store>,
        queue: RelayQueue,
        settings: BotSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            api,
            store,
            queue,
            accounts: None,
            settings,
            shutdown,
        }
    }

    /// Enable /login with the given account backend
    pub fn with_accounts(mut self, accounts: Arc<dyn AccountApi>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Commands shown in the Telegram menu
    pub fn commands() -> Vec<BotCommand> {
        vec![
            BotCommand::new("start", "Start the bot"),
            BotCommand::new("help", "Show commands"),
            BotCommand::new("batch", "Bulk extraction"),
            BotCommand::new("settings", "Configure settings"),
            BotCommand::new("cancel", "Cancel ongoing batch"),
            BotCommand::new("myplan", "Your current plan"),
            BotCommand::new("plan", "Available plans"),
            BotCommand::new("login", "Login for private channels"),
            BotCommand::new("logout", "Logout from bot"),
        ]
    }

    /// Register the command menu. Failure only costs the menu.
    pub async fn register_commands(&self) {
        match self.api.set_my_commands(&Self::commands()).await {
            Ok(()) => tracing::info!("Bot commands registered"),
            Err(e) => tracing::warn!(error = %e, "Failed to register bot commands"),
        }
    }

    /// Long-poll for updates until shutdown
    #[instrument(name = "bot.poller", skip_all)]
    pub async fn run(self: Arc<Self>) {
        tracing::info!("Polling for updates");
        let mut shutdown = self.shutdown.clone();
        let timeout = self.settings.poll_timeout.as_secs();
        let mut offset = 0i64;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let updates = tokio::select! {
                _ = shutdown.changed() => break,
                updates = self.api.get_updates(offset, timeout) => updates,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let update_id = update.update_id;
                        if let Err(e) = self.handle_update(update).await {
                            tracing::warn!(update_id, error = %e, "Failed to handle update");
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "getUpdates failed");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(Duration::from_secs(POLL_RETRY_DELAY_SECS)) => {}
                    }
                }
            }
        }

        tracing::info!("Poller stopped");
    }

    /// Handle a single update
    pub async fn handle_update(&self, update: Update) -> Result<(), TelegramError> {
        if let Some(query) = update.callback_query {
            return self.handle_callback(query).await;
        }
        if let Some(message) = update.message {
            return self.handle_message(message).await;
        }
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> Result<(), TelegramError> {
        let Some(user) = message.from.as_ref() else {
            return Ok(());
        };
        if user.is_bot {
            return Ok(());
        }
        let user_id = user.id;
        let chat_id = message.chat.id;

        if let Some(photo) = message.photo.as_deref() {
            return self.handle_photo(user_id, chat_id, photo).await;
        }

        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };

        if let Some((command, args)) = parse_command(text) {
            return self.handle_command(user_id, chat_id, &command, args).await;
        }

        self.handle_text(user_id, chat_id, text.trim()).await
    }

    async fn reply(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        self.api.send_message(chat_id, text, keyboard).await
    }
}
