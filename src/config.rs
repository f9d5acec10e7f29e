//! Configuration loading and constants.
//!
//! Loads application configuration from an optional TOML file, then applies
//! environment overrides (`BOT_TOKEN`, `OWNER_ID`, `PORT`, ...) so the bot can
//! run in a container with nothing but environment variables. `AppConfig` is
//! the root configuration struct containing all settings.

use serde::Deserialize;
use std::path::Path;

// =============================================================================
// Telegram Limits
// =============================================================================

/// Maximum caption length accepted by Telegram for media messages
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;

/// Largest edge (in pixels) Telegram accepts for a document thumbnail
pub const THUMBNAIL_MAX_EDGE: u32 = 320;

/// Number of times a request is retried after a 429 flood-wait response
pub const TELEGRAM_MAX_FLOOD_RETRIES: u32 = 3;

// =============================================================================
// Retry and Timing Constants
// =============================================================================

/// Delay in seconds before polling again after a failed getUpdates call
pub const POLL_RETRY_DELAY_SECS: u64 = 5;

/// Grace period for in-flight HTTP connections during shutdown
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

// =============================================================================
// HTTP Cache Control
// =============================================================================

/// Health responses must always be fresh
pub const CACHE_CONTROL_NO_STORE: &str = "no-store";

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "ratna=info,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Default Bot API endpoint
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Default branding line appended to bot messages
pub const DEFAULT_BRAND_NAME: &str = "RATNA";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration (health endpoint)
    #[serde(default)]
    pub http: HttpServerConfig,
    /// Bot API connection settings
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Bot ownership and branding
    #[serde(default)]
    pub bot: BotConfig,
    /// Relay queue and worker settings
    #[serde(default)]
    pub queue: QueueConfig,
    /// Batch size limits per plan
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Account login over MTProto
    #[serde(default)]
    pub account: AccountConfig,
    /// State snapshot settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }
}

/// Bot API connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by @BotFather
    #[serde(default)]
    pub token: String,
    /// Base URL of the Bot API server
    #[serde(default = "TelegramConfig::default_api_url")]
    pub api_url: String,
    /// Long-poll timeout passed to getUpdates
    #[serde(default = "TelegramConfig::default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    /// Timeout for ordinary API calls (long polls add the poll timeout on top)
    #[serde(default = "TelegramConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Largest file the bot will download for re-upload (Bot API cap is 20 MiB)
    #[serde(default = "TelegramConfig::default_download_limit")]
    pub download_limit_bytes: u64,
    /// Largest document the bot may upload (Bot API cap is 50 MiB)
    #[serde(default = "TelegramConfig::default_upload_limit")]
    pub upload_limit_bytes: u64,
    /// Chat used to read source messages by forwarding. Defaults to the owner.
    pub staging_chat_id: Option<i64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: Self::default_api_url(),
            poll_timeout_seconds: Self::default_poll_timeout(),
            request_timeout_seconds: Self::default_request_timeout(),
            download_limit_bytes: Self::default_download_limit(),
            upload_limit_bytes: Self::default_upload_limit(),
            staging_chat_id: None,
        }
    }
}

impl TelegramConfig {
    fn default_api_url() -> String {
        DEFAULT_TELEGRAM_API_URL.to_string()
    }

    fn default_poll_timeout() -> u64 {
        30
    }

    fn default_request_timeout() -> u64 {
        60
    }

    fn default_download_limit() -> u64 {
        20 * 1024 * 1024
    }

    fn default_upload_limit() -> u64 {
        50 * 1024 * 1024
    }
}

/// Telegram application credentials for account login.
///
/// Login is disabled while `api_id` is zero.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountConfig {
    /// Application id from my.telegram.org
    #[serde(default)]
    pub api_id: i32,
    #[serde(default)]
    pub api_hash: String,
}

impl AccountConfig {
    pub fn enabled(&self) -> bool {
        self.api_id != 0
    }
}

/// Bot ownership and branding
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Telegram user id of the owner (admin commands, always premium)
    #[serde(default)]
    pub owner_id: i64,
    /// Name shown in the "Powered by" footer
    #[serde(default = "BotConfig::default_brand_name")]
    pub brand_name: String,
    /// Users granted premium at start-up in addition to the owner
    #[serde(default)]
    pub premium_ids: Vec<i64>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            owner_id: 0,
            brand_name: Self::default_brand_name(),
            premium_ids: Vec::new(),
        }
    }
}

impl BotConfig {
    fn default_brand_name() -> String {
        DEFAULT_BRAND_NAME.to_string()
    }
}

/// Relay queue and worker settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Number of relay workers pulling from the queue
    #[serde(default = "QueueConfig::default_workers")]
    pub workers: usize,
    /// Pause between tasks on one worker, keeps the bot under flood limits
    #[serde(default = "QueueConfig::default_task_delay")]
    pub task_delay_ms: u64,
    /// Maximum number of queued tasks across all users
    #[serde(default = "QueueConfig::default_capacity")]
    pub capacity: usize,
    /// Minimum time between progress samples of one transfer
    #[serde(default = "QueueConfig::default_progress_interval")]
    pub progress_interval_seconds: u64,
    /// How often a batch status message is refreshed
    #[serde(default = "QueueConfig::default_monitor_interval")]
    pub monitor_interval_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
            task_delay_ms: Self::default_task_delay(),
            capacity: Self::default_capacity(),
            progress_interval_seconds: Self::default_progress_interval(),
            monitor_interval_seconds: Self::default_monitor_interval(),
        }
    }
}

impl QueueConfig {
    fn default_workers() -> usize {
        1
    }

    fn default_task_delay() -> u64 {
        1000
    }

    fn default_capacity() -> usize {
        10_000
    }

    fn default_progress_interval() -> u64 {
        3
    }

    fn default_monitor_interval() -> u64 {
        5
    }
}

/// Batch size limits per plan
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "LimitsConfig::default_free_batch")]
    pub free_batch: u32,
    #[serde(default = "LimitsConfig::default_premium_batch")]
    pub premium_batch: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            free_batch: Self::default_free_batch(),
            premium_batch: Self::default_premium_batch(),
        }
    }
}

impl LimitsConfig {
    fn default_free_batch() -> u32 {
        3
    }

    fn default_premium_batch() -> u32 {
        1000
    }

    /// Batch limit for a user on the given plan
    pub fn batch_limit(&self, premium: bool) -> u32 {
        if premium {
            self.premium_batch
        } else {
            self.free_batch
        }
    }
}

/// State snapshot settings
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding user settings and the premium set. Unset keeps state in memory only.
    pub state_file: Option<String>,
    #[serde(default = "StorageConfig::default_snapshot_interval")]
    pub snapshot_interval_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: None,
            snapshot_interval_seconds: Self::default_snapshot_interval(),
        }
    }
}

impl StorageConfig {
    fn default_snapshot_interval() -> u64 {
        60
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    /// Load configuration from `path`, then apply environment overrides and validate.
    ///
    /// A missing file is only an error when `required` is set, so the default
    /// path can be absent in a container that configures everything via env.
    pub fn load<P: AsRef<Path>>(path: P, required: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                AppConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("BOT_TOKEN") {
            self.telegram.token = token;
        }
        if let Some(owner) = lookup("OWNER_ID") {
            self.bot.owner_id = parse_env("OWNER_ID", &owner)?;
        }
        if let Some(port) = lookup("PORT") {
            self.http.port = parse_env("PORT", &port)?;
        }
        if let Some(staging) = lookup("STAGING_CHAT_ID") {
            self.telegram.staging_chat_id = Some(parse_env("STAGING_CHAT_ID", &staging)?);
        }
        if let Some(state_file) = lookup("STATE_FILE") {
            self.storage.state_file = Some(state_file);
        }
        if let Some(api_url) = lookup("TELEGRAM_API_URL") {
            self.telegram.api_url = api_url;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(api_id) = lookup("API_ID") {
            self.account.api_id = parse_env("API_ID", &api_id)?;
        }
        if let Some(api_hash) = lookup("API_HASH") {
            self.account.api_hash = api_hash;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "No bot token configured. Set BOT_TOKEN or [telegram] token".to_string(),
            ));
        }
        if self.bot.owner_id == 0 {
            return Err(ConfigError::Validation(
                "No owner configured. Set OWNER_ID or [bot] owner_id".to_string(),
            ));
        }
        if self.queue.workers == 0 {
            return Err(ConfigError::Validation(
                "queue.workers must be at least 1".to_string(),
            ));
        }
        if self.queue.monitor_interval_seconds == 0 {
            return Err(ConfigError::Validation(
                "queue.monitor_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.storage.state_file.is_some() && self.storage.snapshot_interval_seconds == 0 {
            return Err(ConfigError::Validation(
                "storage.snapshot_interval_seconds must be at least 1".to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Validation(format!(
                "logging.format must be \"text\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        if self.account.enabled() && self.account.api_hash.trim().is_empty() {
            return Err(ConfigError::Validation(
                "API_ID is set but API_HASH is empty".to_string(),
            ));
        }
        if self.limits.free_batch > self.limits.premium_batch {
            return Err(ConfigError::Validation(
                "limits.free_batch cannot exceed limits.premium_batch".to_string(),
            ));
        }
        Ok(())
    }

    /// Chat used to stage source messages before relaying them
    pub fn staging_chat_id(&self) -> i64 {
        self.telegram.staging_chat_id.unwrap_or(self.bot.owner_id)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{} has an invalid value: {:?}", key, value)))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_container_contract() {
        let config = AppConfig::default();
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.queue.workers, 1);
        assert_eq!(config.limits.free_batch, 3);
        assert_eq!(config.limits.premium_batch, 1000);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config: AppConfig = toml::from_str(
            r#"
            [http]
            port = 9000

            [telegram]
            token = "from-file"
            "#,
        )
        .unwrap();

        config
            .apply_env(env(&[("BOT_TOKEN", "123:abc"), ("OWNER_ID", "42"), ("PORT", "8081")]))
            .unwrap();

        assert_eq!(config.telegram.token, "123:abc");
        assert_eq!(config.bot.owner_id, 42);
        assert_eq!(config.http.port, 8081);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_owner_id_is_rejected() {
        let mut config = AppConfig::default();
        let err = config.apply_env(env(&[("OWNER_ID", "not-a-number")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_validation_requires_token_and_owner() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());

        config.telegram.token = "123:abc".to_string();
        assert!(config.validate().is_err());

        config.bot.owner_id = 7;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        let mut config = AppConfig::default();
        config.telegram.token = "123:abc".to_string();
        config.bot.owner_id = 7;
        config.apply_env(env(&[("LOG_FORMAT", "json")])).unwrap();
        assert!(config.validate().is_ok());

        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_account_login_needs_both_credentials() {
        let mut config = AppConfig::default();
        config.telegram.token = "123:abc".to_string();
        config.bot.owner_id = 7;
        assert!(!config.account.enabled());

        // API_ID=0 keeps login disabled
        config.apply_env(env(&[("API_ID", "0")])).unwrap();
        assert!(config.validate().is_ok());

        config.apply_env(env(&[("API_ID", "12345")])).unwrap();
        assert!(config.account.enabled());
        assert!(config.validate().is_err());

        config.apply_env(env(&[("API_HASH", "0123abcd")])).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_staging_chat_defaults_to_owner() {
        let mut config = AppConfig::default();
        config.bot.owner_id = 99;
        assert_eq!(config.staging_chat_id(), 99);

        config.telegram.staging_chat_id = Some(-100123);
        assert_eq!(config.staging_chat_id(), -100123);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            AppConfig::load(&path, true),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_batch_limit_by_plan() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.batch_limit(true), 1000);
        assert_eq!(limits.batch_limit(false), 3);
    }
}
