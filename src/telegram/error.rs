//! Error types for Bot API calls

/// Errors returned by [`super::TelegramApi`] implementations
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    /// Transport failure. The URL is stripped because it embeds the bot token.
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    /// Telegram answered with `ok: false`
    #[error("Telegram API error {code}: {description}")]
    Api {
        code: i32,
        description: String,
        retry_after: Option<u64>,
    },

    /// The response could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        TelegramError::Http(e.without_url())
    }
}

impl TelegramError {
    pub fn api(code: i32, description: impl Into<String>) -> Self {
        TelegramError::Api {
            code,
            description: description.into(),
            retry_after: None,
        }
    }

    /// Edits that would leave a message unchanged are rejected with this error
    pub fn is_not_modified(&self) -> bool {
        matches!(
            self,
            TelegramError::Api { code: 400, description, .. }
                if description.contains("message is not modified")
        )
    }

    /// The bot token was rejected. Retrying cannot help.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TelegramError::Api { code: 401, .. })
    }

    /// Seconds Telegram asked us to wait, if this is a flood-wait error
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            TelegramError::Api {
                code: 429,
                retry_after,
                ..
            } => *retry_after,
            _ => None,
        }
    }
}
