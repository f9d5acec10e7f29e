//! Telegram Bot API access.
//!
//! [`TelegramApi`] is the seam between the bot logic and the network: the
//! production implementation is [`BotApiClient`], tests substitute an
//! in-memory fake.

mod client;
mod error;
mod types;

pub use client::BotApiClient;
pub use error::TelegramError;
pub use types::*;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::sync::watch;

/// Streamed body of a downloaded file
pub type ByteStream = BoxStream<'static, Result<Bytes, TelegramError>>;

/// The Bot API methods the relay uses
#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn get_me(&self) -> Result<User, TelegramError>;

    /// Long-poll for updates newer than `offset`
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TelegramError>;

    /// Send an HTML-formatted message
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError>;

    /// Replace the text of a message. "Not modified" errors are swallowed.
    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError>;

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError>;

    async fn forward_message(
        &self,
        chat_id: i64,
        from: &ChatRef,
        message_id: i32,
    ) -> Result<Message, TelegramError>;

    /// Copy a message without the forward header, optionally replacing its caption
    async fn copy_message(
        &self,
        chat_id: i64,
        from_chat_id: i64,
        message_id: i32,
        caption: Option<&str>,
    ) -> Result<MessageId, TelegramError>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), TelegramError>;

    async fn get_file(&self, file_id: &str) -> Result<File, TelegramError>;

    /// Stream the contents of a file previously resolved with `get_file`
    async fn download_file(&self, file_path: &str) -> Result<ByteStream, TelegramError>;

    async fn send_document(&self, chat_id: i64, upload: DocumentUpload)
        -> Result<Message, TelegramError>;

    async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), TelegramError>;
}

/// Fetch the bot's own user, retrying failed calls every `retry_delay`.
///
/// Only a rejected token is fatal. Returns `Ok(None)` when shutdown is
/// requested before Telegram answers.
pub async fn wait_for_identity(
    api: &dyn TelegramApi,
    retry_delay: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Option<User>, TelegramError> {
    loop {
        if *shutdown.borrow() {
            return Ok(None);
        }

        let result = tokio::select! {
            _ = shutdown.changed() => return Ok(None),
            result = api.get_me() => result,
        };
        match result {
            Ok(me) => return Ok(Some(me)),
            Err(e) if e.is_unauthorized() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_in_secs = retry_delay.as_secs(),
                    "getMe failed, retrying"
                );
                tokio::select! {
                    _ = shutdown.changed() => return Ok(None),
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
        }
    }
}
