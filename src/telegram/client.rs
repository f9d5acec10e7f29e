//! Bot API HTTP client.
//!
//! Every method is a POST to `{api_url}/bot{token}/{method}`. Responses are
//! decoded from the `{"ok": .., "result": ..}` envelope and flood-wait errors
//! are retried after the delay Telegram asks for.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::config::{TelegramConfig, TELEGRAM_MAX_FLOOD_RETRIES};

use super::error::TelegramError;
use super::types::{
    ApiResponse, BotCommand, ChatRef, DocumentUpload, File, InlineKeyboardMarkup, Message,
    MessageId, Update, User,
};
use super::{ByteStream, TelegramApi};

/// Connection timeout for Bot API requests
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reqwest-backed Bot API client
#[derive(Debug, Clone)]
pub struct BotApiClient {
    client: Client,
    /// `{api_url}/bot{token}`
    method_base: String,
    /// `{api_url}/file/bot{token}`
    file_base: String,
    request_timeout: Duration,
}

impl BotApiClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, TelegramError> {
        let request_timeout = Duration::from_secs(config.request_timeout_seconds);
        // A stalled body fails instead of hanging a worker. Long polls stay
        // silent for the whole poll timeout, so that is allowed on top.
        let read_timeout = request_timeout + Duration::from_secs(config.poll_timeout_seconds);
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(read_timeout)
            .build()?;
        let api_url = config.api_url.trim_end_matches('/');

        Ok(Self {
            client,
            method_base: format!("{}/bot{}", api_url, config.token),
            file_base: format!("{}/file/bot{}", api_url, config.token),
            request_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.method_base, method)
    }

    /// Call a method with a JSON body
    async fn call<P, R>(&self, method: &str, params: &P, timeout: Duration) -> Result<R, TelegramError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.method_url(method);
        self.send_with_retry(method, || {
            self.client.post(&url).json(params).timeout(timeout)
        })
        .await
    }

    /// Send a request built by `build`, retrying on flood-wait responses.
    ///
    /// The builder is invoked once per attempt because multipart bodies
    /// cannot be cloned.
    async fn send_with_retry<F, R>(&self, method: &str, build: F) -> Result<R, TelegramError>
    where
        F: Fn() -> RequestBuilder,
        R: DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            let response = build().send().await?;
            let status = response.status();
            let envelope: ApiResponse<R> = response.json().await.map_err(|e| {
                TelegramError::InvalidResponse(format!("{} ({}): {}", method, status, e.without_url()))
            })?;

            match decode_envelope(envelope) {
                Err(e) if attempt < TELEGRAM_MAX_FLOOD_RETRIES && e.retry_after().is_some() => {
                    let wait = e.retry_after().unwrap_or(1);
                    attempt += 1;
                    warn!(method, wait_secs = wait, attempt, "Flood wait, retrying");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                result => return result,
            }
        }
    }
}

/// Turn a response envelope into the method result or an API error
fn decode_envelope<R>(envelope: ApiResponse<R>) -> Result<R, TelegramError> {
    if envelope.ok {
        return envelope
            .result
            .ok_or_else(|| TelegramError::InvalidResponse("ok response without result".into()));
    }

    Err(TelegramError::Api {
        code: envelope.error_code.unwrap_or(0),
        description: envelope
            .description
            .unwrap_or_else(|| "unknown error".to_string()),
        retry_after: envelope.parameters.and_then(|p| p.retry_after),
    })
}

#[async_trait]
impl TelegramApi for BotApiClient {
    #[instrument(skip(self))]
    async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &json!({}), self.request_timeout).await
    }

    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TelegramError> {
        let params = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        // The long poll itself holds the connection open for timeout_secs
        let timeout = self.request_timeout + Duration::from_secs(timeout_secs);
        self.call("getUpdates", &params, timeout).await
    }

    #[instrument(skip(self, text, keyboard))]
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        let mut params = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "link_preview_options": { "is_disabled": true },
        });
        if let Some(keyboard) = keyboard {
            params["reply_markup"] = json!(keyboard);
        }
        self.call("sendMessage", &params, self.request_timeout).await
    }

    #[instrument(skip(self, text, keyboard))]
    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        let mut params = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
            "link_preview_options": { "is_disabled": true },
        });
        if let Some(keyboard) = keyboard {
            params["reply_markup"] = json!(keyboard);
        }
        // Returns the edited Message (or `true` for inline messages); neither is needed
        let result: Result<serde_json::Value, _> =
            self.call("editMessageText", &params, self.request_timeout).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_modified() => {
                debug!("Edit skipped, message not modified");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &json!({ "callback_query_id": callback_query_id }),
                self.request_timeout,
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, from), fields(from = %from))]
    async fn forward_message(
        &self,
        chat_id: i64,
        from: &ChatRef,
        message_id: i32,
    ) -> Result<Message, TelegramError> {
        let params = json!({
            "chat_id": chat_id,
            "from_chat_id": from,
            "message_id": message_id,
            "disable_notification": true,
        });
        self.call("forwardMessage", &params, self.request_timeout).await
    }

    #[instrument(skip(self, caption))]
    async fn copy_message(
        &self,
        chat_id: i64,
        from_chat_id: i64,
        message_id: i32,
        caption: Option<&str>,
    ) -> Result<MessageId, TelegramError> {
        let mut params = json!({
            "chat_id": chat_id,
            "from_chat_id": from_chat_id,
            "message_id": message_id,
        });
        if let Some(caption) = caption {
            params["caption"] = json!(caption);
        }
        self.call("copyMessage", &params, self.request_timeout).await
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), TelegramError> {
        let _: bool = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": chat_id, "message_id": message_id }),
                self.request_timeout,
            )
            .await?;
        Ok(())
    }

    async fn get_file(&self, file_id: &str) -> Result<File, TelegramError> {
        self.call("getFile", &json!({ "file_id": file_id }), self.request_timeout)
            .await
    }

    async fn download_file(&self, file_path: &str) -> Result<ByteStream, TelegramError> {
        let url = format!("{}/{}", self.file_base, file_path);
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout * 10)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TelegramError::api(
                i32::from(status.as_u16()),
                format!("file download failed with {}", status),
            ));
        }
        Ok(Box::pin(response.bytes_stream().map_err(TelegramError::from)))
    }

    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, size = upload.data.len()))]
    async fn send_document(
        &self,
        chat_id: i64,
        upload: DocumentUpload,
    ) -> Result<Message, TelegramError> {
        let url = self.method_url("sendDocument");
        // Uploads can take far longer than ordinary calls
        let timeout = self.request_timeout * 10;

        self.send_with_retry("sendDocument", || {
            let mut form = Form::new()
                .text("chat_id", chat_id.to_string())
                .text("disable_content_type_detection", "true")
                .part(
                    "document",
                    Part::bytes(upload.data.clone()).file_name(upload.file_name.clone()),
                );
            if let Some(caption) = &upload.caption {
                form = form.text("caption", caption.clone());
            }
            if let Some(thumbnail) = &upload.thumbnail {
                form = form.part(
                    "thumbnail",
                    Part::bytes(thumbnail.clone()).file_name("thumbnail.jpg"),
                );
            }
            self.client.post(&url).multipart(form).timeout(timeout)
        })
        .await
    }

    async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), TelegramError> {
        let _: bool = self
            .call(
                "setMyCommands",
                &json!({ "commands": commands, "language_code": "en" }),
                self.request_timeout,
            )
            .await?;
        Ok(())
    }
}
