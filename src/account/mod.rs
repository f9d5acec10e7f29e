//! Telegram user accounts.
//!
//! The Bot API can only read what the bot itself can see. Users who log in
//! with their own account let the relay read posts from private channels and
//! from chats where forwarding is restricted. [`AccountApi`] is the seam: the
//! production implementation is [`MtprotoAccounts`], tests substitute a fake.
//!
//! A login runs in three steps (phone number, login code, optional 2FA
//! password). The implementation holds the half-finished login between steps;
//! the finished session is returned as an opaque string the caller stores.

mod mtproto;

pub use mtproto::MtprotoAccounts;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::telegram::ChatRef;

/// Streamed contents of a media file read through an account
pub type MediaStream = BoxStream<'static, Result<Bytes, AccountError>>;

/// Result of submitting a login code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignIn {
    /// Logged in; carries the serialized session
    Complete(String),
    /// The account has two-step verification enabled
    PasswordRequired,
}

/// A post read through a user account
pub struct AccountPost {
    /// Caption or message text, empty when absent
    pub caption: String,
    pub media: Option<AccountMedia>,
}

/// Downloadable media attached to an [`AccountPost`]
pub struct AccountMedia {
    pub file_name: Option<String>,
    /// Size in bytes, 0 when Telegram does not report one
    pub size: u64,
    pub content: MediaStream,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("No login in progress")]
    NoLogin,
    #[error("Invalid login code")]
    InvalidCode,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Session is no longer authorized")]
    Unauthorized,
    #[error("Stored session is unreadable: {0}")]
    InvalidSession(String),
    #[error("Chat {0} not found among the account's dialogs")]
    ChatNotFound(ChatRef),
    #[error("Message {chat}/{message_id} not found")]
    MessageNotFound { chat: ChatRef, message_id: i32 },
    #[error("Telegram error: {0}")]
    Remote(String),
}

impl AccountError {
    /// The stored session cannot be used any more and should be dropped
    pub fn is_session_lost(&self) -> bool {
        matches!(
            self,
            AccountError::Unauthorized | AccountError::InvalidSession(_)
        )
    }
}

#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Start a login for `user_id` by sending a code to `phone`
    async fn request_code(&self, user_id: i64, phone: &str) -> Result<(), AccountError>;

    /// Complete the code step of the login in progress
    async fn submit_code(&self, user_id: i64, code: &str) -> Result<SignIn, AccountError>;

    /// Complete the 2FA step of the login in progress, returning the session
    async fn submit_password(&self, user_id: i64, password: &str) -> Result<String, AccountError>;

    /// Drop any login in progress for `user_id`
    async fn abandon_login(&self, user_id: i64);

    /// Read one post with a stored session
    async fn fetch_post(
        &self,
        session: &str,
        chat: &ChatRef,
        message_id: i32,
    ) -> Result<AccountPost, AccountError>;
}
