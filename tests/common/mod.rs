//! In-memory Bot API used by the integration tests.
//!
//! Source messages are registered up front; forwarding one "stages" a copy in
//! the requested chat just like Telegram does. Every call is recorded.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;

use ratna::account::{AccountApi, AccountError, AccountMedia, AccountPost, SignIn};
use ratna::relay::RelayOptions;
use ratna::telegram::{
    BotCommand, ByteStream, ChatRef, DocumentUpload, File, InlineKeyboardMarkup, Message,
    MessageId, TelegramApi, TelegramError, Update, User,
};

pub const OWNER_ID: i64 = 1000;
pub const USER_ID: i64 = 2000;

pub fn relay_options(staging_chat_id: i64, download_limit_bytes: u64) -> RelayOptions {
    RelayOptions {
        staging_chat_id,
        download_limit_bytes,
        upload_limit_bytes: 50 * 1024 * 1024,
        stall_timeout: Duration::from_secs(5),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SendMessage {
        chat_id: i64,
        text: String,
        keyboard: Option<InlineKeyboardMarkup>,
    },
    EditMessage {
        chat_id: i64,
        message_id: i32,
        text: String,
    },
    AnswerCallback(String),
    Forward {
        chat_id: i64,
        from: ChatRef,
        message_id: i32,
    },
    Copy {
        chat_id: i64,
        from_chat_id: i64,
        message_id: i32,
        caption: Option<String>,
    },
    Delete {
        chat_id: i64,
        message_id: i32,
    },
    GetFile(String),
    Download(String),
    SendDocument {
        chat_id: i64,
        file_name: String,
        caption: Option<String>,
        size: usize,
        thumbnail: Option<Vec<u8>>,
    },
    SetCommands(Vec<String>),
}

#[derive(Default)]
pub struct FakeTelegram {
    calls: Mutex<Vec<Call>>,
    sources: Mutex<HashMap<(ChatRef, i32), Message>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    updates: Mutex<VecDeque<Vec<Update>>>,
    next_message_id: AtomicI32,
    /// getMe calls that fail before one succeeds
    get_me_failures: AtomicUsize,
    get_me_calls: AtomicUsize,
    unauthorized: AtomicBool,
    /// Downloads open but never deliver a byte
    stall_downloads: AtomicBool,
}

impl FakeTelegram {
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI32::new(500),
            ..Default::default()
        }
    }

    /// Register a message the bot can read
    pub fn add_source(&self, chat: ChatRef, message_id: i32, message: Message) {
        self.sources
            .lock()
            .unwrap()
            .insert((chat, message_id), message);
    }

    /// Register downloadable file contents
    pub fn add_file(&self, file_id: &str, data: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(file_id.to_string(), data.to_vec());
    }

    pub fn fail_get_me(&self, times: usize) {
        self.get_me_failures.store(times, Ordering::SeqCst);
    }

    pub fn reject_token(&self) {
        self.unauthorized.store(true, Ordering::SeqCst);
    }

    pub fn get_me_calls(&self) -> usize {
        self.get_me_calls.load(Ordering::SeqCst)
    }

    pub fn stall_downloads(&self) {
        self.stall_downloads.store(true, Ordering::SeqCst);
    }

    pub fn push_updates(&self, updates: Vec<Update>) {
        self.updates.lock().unwrap().push_back(updates);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Texts sent with sendMessage, in order
    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SendMessage { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Texts written with editMessageText, in order
    pub fn edited_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::EditMessage { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_id(&self) -> i32 {
        self.next_message_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl TelegramApi for FakeTelegram {
    async fn get_me(&self) -> Result<User, TelegramError> {
        self.get_me_calls.fetch_add(1, Ordering::SeqCst);
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(TelegramError::api(401, "Unauthorized"));
        }
        let failing = self
            .get_me_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TelegramError::api(502, "Bad Gateway"));
        }
        Ok(User {
            id: 1,
            is_bot: true,
            first_name: "Ratna".to_string(),
            username: Some("RatnaBot".to_string()),
        })
    }

    async fn get_updates(&self, _offset: i64, _timeout_secs: u64) -> Result<Vec<Update>, TelegramError> {
        let next = self.updates.lock().unwrap().pop_front();
        match next {
            Some(updates) => Ok(updates),
            None => {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        self.record(Call::SendMessage {
            chat_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(text_message(chat_id, self.next_id(), text, None))
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        _keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        self.record(Call::EditMessage {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError> {
        self.record(Call::AnswerCallback(callback_query_id.to_string()));
        Ok(())
    }

    async fn forward_message(
        &self,
        chat_id: i64,
        from: &ChatRef,
        message_id: i32,
    ) -> Result<Message, TelegramError> {
        self.record(Call::Forward {
            chat_id,
            from: from.clone(),
            message_id,
        });
        let source = self
            .sources
            .lock()
            .unwrap()
            .get(&(from.clone(), message_id))
            .cloned();
        let mut staged = source
            .ok_or_else(|| TelegramError::api(400, "Bad Request: message to forward not found"))?;
        staged.chat.id = chat_id;
        staged.message_id = self.next_id();
        Ok(staged)
    }

    async fn copy_message(
        &self,
        chat_id: i64,
        from_chat_id: i64,
        message_id: i32,
        caption: Option<&str>,
    ) -> Result<MessageId, TelegramError> {
        self.record(Call::Copy {
            chat_id,
            from_chat_id,
            message_id,
            caption: caption.map(str::to_string),
        });
        Ok(MessageId {
            message_id: self.next_id(),
        })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), TelegramError> {
        self.record(Call::Delete {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn get_file(&self, file_id: &str) -> Result<File, TelegramError> {
        self.record(Call::GetFile(file_id.to_string()));
        let size = self
            .files
            .lock()
            .unwrap()
            .get(file_id)
            .map(|data| data.len() as u64)
            .ok_or_else(|| TelegramError::api(400, "Bad Request: invalid file_id"))?;
        Ok(File {
            file_id: file_id.to_string(),
            file_unique_id: format!("u-{}", file_id),
            file_size: Some(size),
            file_path: Some(format!("files/{}", file_id)),
        })
    }

    async fn download_file(&self, file_path: &str) -> Result<ByteStream, TelegramError> {
        self.record(Call::Download(file_path.to_string()));
        let file_id = file_path.trim_start_matches("files/");
        let data = self
            .files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| TelegramError::api(404, "Not Found"))?;
        if self.stall_downloads.load(Ordering::SeqCst) {
            return Ok(futures::stream::pending().boxed());
        }
        // Two chunks so progress sees more than one sample
        let mid = data.len() / 2;
        let chunks: Vec<Result<Bytes, TelegramError>> = vec![
            Ok(Bytes::copy_from_slice(&data[..mid])),
            Ok(Bytes::copy_from_slice(&data[mid..])),
        ];
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        upload: DocumentUpload,
    ) -> Result<Message, TelegramError> {
        self.record(Call::SendDocument {
            chat_id,
            file_name: upload.file_name.clone(),
            caption: upload.caption.clone(),
            size: upload.data.len(),
            thumbnail: upload.thumbnail.clone(),
        });
        Ok(text_message(chat_id, self.next_id(), "", upload.caption.as_deref()))
    }

    async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), TelegramError> {
        self.record(Call::SetCommands(
            commands.iter().map(|c| c.command.clone()).collect(),
        ));
        Ok(())
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// Login code that completes a login
pub const GOOD_CODE: &str = "12345";
/// Login code for an account with two-step verification
pub const TWO_FACTOR_CODE: &str = "22222";
pub const GOOD_PASSWORD: &str = "hunter2";
/// Session Telegram no longer accepts
pub const EXPIRED_SESSION: &str = "expired";

/// A post readable through an account: caption and optional (file name, bytes)
type AccountSource = (String, Option<(Option<String>, Vec<u8>)>);

/// In-memory account backend
#[derive(Default)]
pub struct FakeAccounts {
    pending: Mutex<HashMap<i64, bool>>,
    posts: Mutex<HashMap<(ChatRef, i32), AccountSource>>,
    pub fetches: Mutex<Vec<(String, ChatRef, i32)>>,
}

impl FakeAccounts {
    pub fn add_post(&self, chat: ChatRef, message_id: i32, caption: &str, file: Option<(Option<&str>, &[u8])>) {
        self.posts.lock().unwrap().insert(
            (chat, message_id),
            (
                caption.to_string(),
                file.map(|(name, data)| (name.map(str::to_string), data.to_vec())),
            ),
        );
    }

    pub fn session_for(user_id: i64) -> String {
        format!("session-{}", user_id)
    }
}

#[async_trait]
impl AccountApi for FakeAccounts {
    async fn request_code(&self, user_id: i64, phone: &str) -> Result<(), AccountError> {
        if phone == "+0" {
            return Err(AccountError::Remote("PHONE_NUMBER_INVALID".to_string()));
        }
        self.pending.lock().unwrap().insert(user_id, false);
        Ok(())
    }

    async fn submit_code(&self, user_id: i64, code: &str) -> Result<SignIn, AccountError> {
        let mut pending = self.pending.lock().unwrap();
        if pending.remove(&user_id).is_none() {
            return Err(AccountError::NoLogin);
        }
        match code {
            GOOD_CODE => Ok(SignIn::Complete(Self::session_for(user_id))),
            TWO_FACTOR_CODE => {
                pending.insert(user_id, true);
                Ok(SignIn::PasswordRequired)
            }
            _ => Err(AccountError::InvalidCode),
        }
    }

    async fn submit_password(&self, user_id: i64, password: &str) -> Result<String, AccountError> {
        match self.pending.lock().unwrap().remove(&user_id) {
            Some(true) if password == GOOD_PASSWORD => Ok(Self::session_for(user_id)),
            Some(true) => Err(AccountError::InvalidPassword),
            _ => Err(AccountError::NoLogin),
        }
    }

    async fn abandon_login(&self, user_id: i64) {
        self.pending.lock().unwrap().remove(&user_id);
    }

    async fn fetch_post(
        &self,
        session: &str,
        chat: &ChatRef,
        message_id: i32,
    ) -> Result<AccountPost, AccountError> {
        self.fetches
            .lock()
            .unwrap()
            .push((session.to_string(), chat.clone(), message_id));
        if session == EXPIRED_SESSION {
            return Err(AccountError::Unauthorized);
        }
        let (caption, file) = self
            .posts
            .lock()
            .unwrap()
            .get(&(chat.clone(), message_id))
            .cloned()
            .ok_or_else(|| AccountError::MessageNotFound {
                chat: chat.clone(),
                message_id,
            })?;
        Ok(AccountPost {
            caption,
            media: file.map(|(file_name, data)| AccountMedia {
                file_name,
                size: data.len() as u64,
                content: futures::stream::iter(vec![Ok::<_, AccountError>(Bytes::from(data))]).boxed(),
            }),
        })
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn text_message(chat_id: i64, message_id: i32, text: &str, caption: Option<&str>) -> Message {
    serde_json::from_value(json!({
        "message_id": message_id,
        "chat": { "id": chat_id, "type": "private" },
        "date": 0,
        "text": text,
        "caption": caption,
    }))
    .unwrap()
}

/// A channel post carrying a document
pub fn document_message(
    file_id: &str,
    file_name: Option<&str>,
    file_size: Option<u64>,
    caption: Option<&str>,
) -> Message {
    serde_json::from_value(json!({
        "message_id": 1,
        "chat": { "id": -1001234, "type": "channel" },
        "date": 0,
        "caption": caption,
        "document": {
            "file_id": file_id,
            "file_unique_id": format!("u-{}", file_id),
            "file_name": file_name,
            "file_size": file_size,
        },
    }))
    .unwrap()
}

fn user(user_id: i64) -> serde_json::Value {
    json!({ "id": user_id, "is_bot": false, "first_name": "Tester" })
}

/// A private text message from `user_id`
pub fn text_update(update_id: i64, user_id: i64, text: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id as i32,
            "from": user(user_id),
            "chat": { "id": user_id, "type": "private" },
            "date": 0,
            "text": text,
        },
    }))
    .unwrap()
}

/// A private photo message from `user_id` with the given (id, width, height) sizes
pub fn photo_update(update_id: i64, user_id: i64, sizes: &[(&str, u32, u32)]) -> Update {
    let photo: Vec<serde_json::Value> = sizes
        .iter()
        .map(|(id, width, height)| {
            json!({
                "file_id": id,
                "file_unique_id": format!("u-{}", id),
                "width": width,
                "height": height,
            })
        })
        .collect();
    serde_json::from_value(json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id as i32,
            "from": user(user_id),
            "chat": { "id": user_id, "type": "private" },
            "date": 0,
            "photo": photo,
        },
    }))
    .unwrap()
}

/// A button press by `user_id` on bot message 77
pub fn callback_update(update_id: i64, user_id: i64, data: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": update_id,
        "callback_query": {
            "id": format!("cb-{}", update_id),
            "from": user(user_id),
            "message": {
                "message_id": 77,
                "chat": { "id": user_id, "type": "private" },
                "date": 0,
                "text": "menu",
            },
            "data": data,
        },
    }))
    .unwrap()
}
