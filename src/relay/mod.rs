//! Relaying one source message to a user's target chat.
//!
//! The Bot API cannot read arbitrary messages by id, so the source message is
//! first forwarded into a staging chat. The staged copy tells us the media,
//! file name and caption. From there the file is either re-uploaded as a
//! document (when the user's rules change its name or add a thumbnail) or
//! copied with the rewritten caption.
//!
//! Users who logged in with their own account are served through that
//! account instead: it reads the post directly, which also works for private
//! channels and for chats that forbid forwarding, and the file is always
//! re-uploaded. A session Telegram no longer accepts is dropped and the task
//! falls back to the bot's own access.

mod link;
mod progress;
mod text;

pub use link::parse_link;
pub use progress::format_progress;
pub use text::{apply_rules, build_caption, rename_file, truncate_chars};

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, instrument, warn};

use crate::account::{AccountApi, AccountError, AccountPost};
use crate::config::AppConfig;
use crate::queue::{RelayTask, TransferHandle};
use crate::store::{Store, UserSettings};
use crate::telegram::{ChatRef, DocumentUpload, Message, TelegramApi, TelegramError};

/// How a message was delivered to the target chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Downloaded and re-uploaded as a document
    Reupload,
    /// Copied server-side with a new caption
    Copy,
    /// Read through the user's account and uploaded as a document
    Account,
}

/// Outcome of a successful relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub file_name: String,
    pub size: u64,
    pub delivery: Delivery,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Cannot access {chat}/{message_id}: {source}")]
    Inaccessible {
        chat: ChatRef,
        message_id: i32,
        #[source]
        source: TelegramError,
    },
    #[error("No media in {chat}/{message_id}")]
    NoMedia { chat: ChatRef, message_id: i32 },
    #[error("Telegram error: {0}")]
    Telegram(#[from] TelegramError),
    #[error("File {0} has no download path")]
    MissingFilePath(String),
    #[error("Account cannot read {chat}/{message_id}: {source}")]
    Account {
        chat: ChatRef,
        message_id: i32,
        #[source]
        source: AccountError,
    },
    #[error("Download failed: {0}")]
    Download(#[from] AccountError),
    #[error("File of {size} bytes exceeds the upload limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("Download stalled for {0:?}")]
    Stalled(Duration),
}

/// Relay settings that do not change per task
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub staging_chat_id: i64,
    pub download_limit_bytes: u64,
    pub upload_limit_bytes: u64,
    /// Longest wait for the next chunk of a download
    pub stall_timeout: Duration,
}

impl RelayOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            staging_chat_id: config.staging_chat_id(),
            download_limit_bytes: config.telegram.download_limit_bytes,
            upload_limit_bytes: config.telegram.upload_limit_bytes,
            stall_timeout: Duration::from_secs(config.telegram.request_timeout_seconds),
        }
    }
}

/// Performs transfers for the relay workers
pub struct Relay {
    api: Arc<dyn TelegramApi>,
    store: Arc<Store>,
    accounts: Option<Arc<dyn AccountApi>>,
    options: RelayOptions,
}

impl Relay {
    pub fn new(api: Arc<dyn TelegramApi>, store: Arc<Store>, options: RelayOptions) -> Self {
        Self {
            api,
            store,
            accounts: None,
            options,
        }
    }

    /// Serve logged-in users through their accounts
    pub fn with_accounts(mut self, accounts: Arc<dyn AccountApi>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Relay one task, reporting byte progress through `handle`
    #[instrument(
        name = "relay.transfer",
        skip(self, task, handle),
        fields(task_id = %task.id, user_id = task.user_id, chat = %task.source, message_id = task.message_id)
    )]
    pub async fn transfer(
        &self,
        task: &RelayTask,
        handle: &TransferHandle,
    ) -> Result<RelayReport, RelayError> {
        let settings = self.store.user(task.user_id).await.settings;

        if let Some(accounts) = &self.accounts {
            if let Some(session) = self.store.session(task.user_id).await {
                match accounts
                    .fetch_post(&session, &task.source, task.message_id)
                    .await
                {
                    Ok(post) => {
                        return self
                            .deliver_account_post(task, &settings, post, handle)
                            .await;
                    }
                    Err(e) if e.is_session_lost() => {
                        warn!(error = %e, "Dropping unusable session, using bot access");
                        self.store.remove_session(task.user_id).await;
                    }
                    Err(source) => {
                        return Err(RelayError::Account {
                            chat: task.source.clone(),
                            message_id: task.message_id,
                            source,
                        });
                    }
                }
            }
        }

        let staged = self
            .api
            .forward_message(self.options.staging_chat_id, &task.source, task.message_id)
            .await
            .map_err(|source| RelayError::Inaccessible {
                chat: task.source.clone(),
                message_id: task.message_id,
                source,
            })?;

        let result = self.deliver(task, &settings, &staged, handle).await;

        // Best effort: the staged copy is only scaffolding
        if let Err(e) = self
            .api
            .delete_message(staged.chat.id, staged.message_id)
            .await
        {
            debug!(error = %e, "Could not delete staged message");
        }

        result
    }

    async fn deliver(
        &self,
        task: &RelayTask,
        settings: &UserSettings,
        staged: &Message,
        handle: &TransferHandle,
    ) -> Result<RelayReport, RelayError> {
        let Some(media) = staged.media() else {
            return Err(RelayError::NoMedia {
                chat: task.source.clone(),
                message_id: task.message_id,
            });
        };

        let original_name = media
            .file_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("file_{}", task.message_id));
        let file_name = target_file_name(settings, &original_name, task.message_id);

        let caption = build_caption(
            staged.caption_or_text(),
            settings.caption.as_deref(),
            &settings.replace_words,
            &settings.remove_words,
        );

        let size = media.file_size.unwrap_or(0);
        handle.describe(&file_name, size).await;
        tracing::info!(file_name = %file_name, size_mb = size as f64 / 1e6, "Starting transfer");

        let needs_reupload = file_name != original_name || settings.thumbnail.is_some();
        let within_limit = media
            .file_size
            .is_some_and(|s| s <= self.options.download_limit_bytes);

        if needs_reupload && !within_limit {
            warn!(
                size,
                limit = self.options.download_limit_bytes,
                "File too large to re-upload, copying with original name"
            );
        }

        if needs_reupload && within_limit {
            let data = self.download(media.file_id, size, handle).await?;
            self.upload(task, settings, &file_name, data, &caption)
                .await?;
            return Ok(RelayReport {
                file_name,
                size,
                delivery: Delivery::Reupload,
            });
        }

        self.api
            .copy_message(
                task.target_chat,
                staged.chat.id,
                staged.message_id,
                Some(caption.as_str()),
            )
            .await?;
        handle.record(size, size).await;
        Ok(RelayReport {
            file_name,
            size,
            delivery: Delivery::Copy,
        })
    }

    /// Relay a post read through the user's account. Media is always
    /// re-uploaded because the bot cannot copy what it cannot see.
    async fn deliver_account_post(
        &self,
        task: &RelayTask,
        settings: &UserSettings,
        post: AccountPost,
        handle: &TransferHandle,
    ) -> Result<RelayReport, RelayError> {
        let Some(media) = post.media else {
            return Err(RelayError::NoMedia {
                chat: task.source.clone(),
                message_id: task.message_id,
            });
        };

        let original_name = media
            .file_name
            .unwrap_or_else(|| format!("file_{}", task.message_id));
        let file_name = target_file_name(settings, &original_name, task.message_id);
        let caption = build_caption(
            &post.caption,
            settings.caption.as_deref(),
            &settings.replace_words,
            &settings.remove_words,
        );

        let size = media.size;
        if size > self.options.upload_limit_bytes {
            return Err(RelayError::TooLarge {
                size,
                limit: self.options.upload_limit_bytes,
            });
        }
        handle.describe(&file_name, size).await;
        tracing::info!(file_name = %file_name, size_mb = size as f64 / 1e6, "Starting account transfer");

        let data = self
            .collect(media.content, size, self.options.upload_limit_bytes, handle)
            .await?;
        let size = data.len() as u64;
        self.upload(task, settings, &file_name, data, &caption)
            .await?;
        Ok(RelayReport {
            file_name,
            size,
            delivery: Delivery::Account,
        })
    }

    /// Send `data` to the task's target as a document with the user's thumbnail
    async fn upload(
        &self,
        task: &RelayTask,
        settings: &UserSettings,
        file_name: &str,
        data: Vec<u8>,
        caption: &str,
    ) -> Result<(), RelayError> {
        let thumbnail = match settings.thumbnail.as_deref() {
            Some(file_id) => self.fetch_thumbnail(file_id).await,
            None => None,
        };
        self.api
            .send_document(
                task.target_chat,
                DocumentUpload {
                    file_name: file_name.to_string(),
                    data,
                    caption: (!caption.is_empty()).then(|| caption.to_string()),
                    thumbnail,
                },
            )
            .await?;
        Ok(())
    }

    /// Download a file into memory, sampling progress as chunks arrive
    async fn download(
        &self,
        file_id: &str,
        expected: u64,
        handle: &TransferHandle,
    ) -> Result<Vec<u8>, RelayError> {
        let file = self.api.get_file(file_id).await?;
        let path = file
            .file_path
            .ok_or_else(|| RelayError::MissingFilePath(file_id.to_string()))?;
        let total = file.file_size.unwrap_or(expected);

        let stream = self.api.download_file(&path).await?;
        self.collect(stream, total, self.options.download_limit_bytes, handle)
            .await
    }

    /// Read a byte stream into memory.
    ///
    /// Fails when no chunk arrives within the stall timeout or the data
    /// outgrows `limit`.
    async fn collect<E>(
        &self,
        mut stream: BoxStream<'static, Result<Bytes, E>>,
        total: u64,
        limit: u64,
        handle: &TransferHandle,
    ) -> Result<Vec<u8>, RelayError>
    where
        RelayError: From<E>,
    {
        let stall = self.options.stall_timeout;
        let mut data = Vec::with_capacity(total.min(limit) as usize);
        loop {
            let next = tokio::time::timeout(stall, stream.next())
                .await
                .map_err(|_| RelayError::Stalled(stall))?;
            let Some(chunk) = next else {
                break;
            };
            data.extend_from_slice(&chunk?);
            if data.len() as u64 > limit {
                return Err(RelayError::TooLarge {
                    size: data.len() as u64,
                    limit,
                });
            }
            handle.record(data.len() as u64, total.max(data.len() as u64)).await;
        }
        handle.record(data.len() as u64, data.len() as u64).await;
        Ok(data)
    }

    /// Thumbnail bytes, or `None` if the stored photo can no longer be fetched
    async fn fetch_thumbnail(&self, file_id: &str) -> Option<Vec<u8>> {
        let fetch = async {
            let file = self.api.get_file(file_id).await?;
            let path = file
                .file_path
                .ok_or_else(|| RelayError::MissingFilePath(file_id.to_string()))?;
            let stall = self.options.stall_timeout;
            let mut stream = self.api.download_file(&path).await?;
            let mut data = Vec::new();
            while let Some(chunk) = tokio::time::timeout(stall, stream.next())
                .await
                .map_err(|_| RelayError::Stalled(stall))?
            {
                data.extend_from_slice(&chunk?);
            }
            Ok::<_, RelayError>(data)
        };

        match fetch.await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(error = %e, "Thumbnail unavailable, uploading without it");
                None
            }
        }
    }
}

/// File name after the user's rename and text rules, never empty
fn target_file_name(settings: &UserSettings, original: &str, message_id: i32) -> String {
    let renamed = match settings.rename.as_deref() {
        Some(base) => rename_file(original, base),
        None => original.to_string(),
    };
    let file_name = apply_rules(&renamed, &settings.replace_words, &settings.remove_words);
    if file_name.is_empty() {
        format!("file_{}", message_id)
    } else {
        file_name
    }
}
