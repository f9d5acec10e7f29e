//! In-memory user store.
//!
//! Holds per-user relay settings, the dialogue state of each user's chat with
//! the bot, the premium set and the account sessions users log in with.
//! Settings, premium membership and sessions can be snapshotted to a JSON
//! file; dialogue state is transient.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;

use crate::telegram::ChatRef;

/// Relay settings a user configures through /settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Chat that relayed files are sent to
    pub chat_id: Option<i64>,
    /// Base name replacing the original file name
    pub rename: Option<String>,
    /// Caption replacing the original caption
    pub caption: Option<String>,
    /// file_id of the photo used as document thumbnail
    pub thumbnail: Option<String>,
    /// Replacement rules, applied in insertion order
    #[serde(default)]
    pub replace_words: Vec<(String, String)>,
    #[serde(default)]
    pub remove_words: Vec<String>,
}

impl UserSettings {
    /// Add a replacement rule, overwriting an existing rule for the same word in place
    pub fn upsert_replace(&mut self, old: String, new: String) {
        match self.replace_words.iter_mut().find(|(k, _)| *k == old) {
            Some(rule) => rule.1 = new,
            None => self.replace_words.push((old, new)),
        }
    }

    /// Clear everything except the target chat
    pub fn reset(&mut self) {
        *self = UserSettings {
            chat_id: self.chat_id,
            ..Default::default()
        };
    }
}

/// Free-text input the bot is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInput {
    ChatId,
    /// Chat id typed right after /settings
    ChatIdDirect,
    Rename,
    Caption,
    Thumbnail,
    ReplaceRule,
    RemoveWords,
}

/// Progress through the /batch dialogue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStep {
    AwaitingLink,
    AwaitingCount { source: ChatRef, start_id: i32 },
}

/// Progress through the /login dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStep {
    AwaitingPhone,
    AwaitingCode,
    AwaitingPassword,
}

/// Everything the bot knows about one user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserRecord {
    pub settings: UserSettings,
    pub pending_input: Option<PendingInput>,
    pub batch_step: Option<BatchStep>,
    pub login_step: Option<LoginStep>,
}

#[derive(Debug, Default)]
struct StoreInner {
    users: HashMap<i64, UserRecord>,
    premium: HashSet<i64>,
    /// Serialized account sessions by user
    sessions: HashMap<i64, String>,
}

/// Serialized form of the store
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    users: HashMap<i64, UserSettings>,
    premium: Vec<i64>,
    #[serde(default)]
    sessions: HashMap<i64, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to access state file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode state: {0}")]
    Json(#[from] serde_json::Error),
}

/// Shared user store
#[derive(Debug)]
pub struct Store {
    owner_id: i64,
    inner: RwLock<StoreInner>,
}

impl Store {
    /// Create a store whose premium set holds the owner and `premium_ids`
    pub fn new(owner_id: i64, premium_ids: &[i64]) -> Self {
        let mut premium: HashSet<i64> = premium_ids.iter().copied().collect();
        premium.insert(owner_id);
        Self {
            owner_id,
            inner: RwLock::new(StoreInner {
                users: HashMap::new(),
                premium,
                sessions: HashMap::new(),
            }),
        }
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        user_id == self.owner_id
    }

    /// Snapshot of a user's record, creating it on first access
    pub async fn user(&self, user_id: i64) -> UserRecord {
        let mut inner = self.inner.write().await;
        inner.users.entry(user_id).or_default().clone()
    }

    /// Mutate a user's record under the store lock, creating it on first access
    pub async fn update<F, R>(&self, user_id: i64, f: F) -> R
    where
        F: FnOnce(&mut UserRecord) -> R,
    {
        let mut inner = self.inner.write().await;
        f(inner.users.entry(user_id).or_default())
    }

    pub async fn is_premium(&self, user_id: i64) -> bool {
        self.inner.read().await.premium.contains(&user_id)
    }

    pub async fn add_premium(&self, user_id: i64) {
        self.inner.write().await.premium.insert(user_id);
    }

    /// Remove a user from the premium set. The owner cannot be removed.
    ///
    /// Returns whether the set changed.
    pub async fn remove_premium(&self, user_id: i64) -> bool {
        if user_id == self.owner_id {
            return false;
        }
        self.inner.write().await.premium.remove(&user_id)
    }

    pub async fn user_count(&self) -> usize {
        self.inner.read().await.users.len()
    }

    pub async fn premium_count(&self) -> usize {
        self.inner.read().await.premium.len()
    }

    /// The account session a user logged in with
    pub async fn session(&self, user_id: i64) -> Option<String> {
        self.inner.read().await.sessions.get(&user_id).cloned()
    }

    pub async fn save_session(&self, user_id: i64, session: String) {
        self.inner.write().await.sessions.insert(user_id, session);
    }

    /// Forget a user's session. Returns whether one was stored.
    pub async fn remove_session(&self, user_id: i64) -> bool {
        self.inner.write().await.sessions.remove(&user_id).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Load settings, premium membership and sessions written by [`Store::save`].
    ///
    /// A missing file leaves the store untouched. The owner stays premium.
    pub async fn load(&self, path: &Path) -> Result<usize, StoreError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_str(&contents)?;

        let mut inner = self.inner.write().await;
        let loaded = snapshot.users.len();
        for (user_id, settings) in snapshot.users {
            inner.users.entry(user_id).or_default().settings = settings;
        }
        inner.premium.extend(snapshot.premium);
        inner.premium.insert(self.owner_id);
        inner.sessions.extend(snapshot.sessions);
        Ok(loaded)
    }

    /// Write settings, premium membership and sessions to `path`.
    ///
    /// The file is replaced atomically via a temporary sibling.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let snapshot = {
            let inner = self.inner.read().await;
            let mut premium: Vec<i64> = inner.premium.iter().copied().collect();
            premium.sort_unstable();
            Snapshot {
                users: inner
                    .users
                    .iter()
                    .map(|(id, record)| (*id, record.settings.clone()))
                    .collect(),
                premium,
                sessions: inner.sessions.clone(),
            }
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Save a snapshot every `interval` until shutdown
    pub async fn run_snapshots(
        self: Arc<Self>,
        path: PathBuf,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            match self.save(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "State snapshot saved"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to save state snapshot"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_user_created_on_first_access() {
        let store = Store::new(1, &[]);
        assert_eq!(store.user_count().await, 0);

        let record = store.user(42).await;
        assert_eq!(record, UserRecord::default());
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_owner_is_premium_and_cannot_be_removed() {
        let store = Store::new(1, &[5]);
        assert!(store.is_premium(1).await);
        assert!(store.is_premium(5).await);
        assert_eq!(store.premium_count().await, 2);

        assert!(!store.remove_premium(1).await);
        assert!(store.is_premium(1).await);

        assert!(store.remove_premium(5).await);
        assert!(!store.remove_premium(5).await);
    }

    #[tokio::test]
    async fn test_add_premium() {
        let store = Store::new(1, &[]);
        assert!(!store.is_premium(9).await);
        store.add_premium(9).await;
        assert!(store.is_premium(9).await);
    }

    #[test]
    fn test_upsert_replace_preserves_order() {
        let mut settings = UserSettings::default();
        settings.upsert_replace("a".into(), "1".into());
        settings.upsert_replace("b".into(), "2".into());
        settings.upsert_replace("a".into(), "3".into());
        assert_eq!(
            settings.replace_words,
            vec![("a".to_string(), "3".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_reset_keeps_target_chat() {
        let mut settings = UserSettings {
            chat_id: Some(-100),
            rename: Some("x".into()),
            caption: Some("y".into()),
            thumbnail: Some("file".into()),
            replace_words: vec![("a".into(), "b".into())],
            remove_words: vec!["c".into()],
        };
        settings.reset();
        assert_eq!(
            settings,
            UserSettings {
                chat_id: Some(-100),
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_keeps_settings_not_dialogue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = Store::new(1, &[]);
        store
            .update(7, |record| {
                record.settings.chat_id = Some(-1001);
                record.settings.upsert_replace("old".into(), "new".into());
                record.pending_input = Some(PendingInput::Caption);
            })
            .await;
        store.add_premium(7).await;
        store.save_session(7, "c2Vzc2lvbg==".into()).await;
        store.save(&path).await.unwrap();

        let restored = Store::new(1, &[]);
        assert_eq!(restored.load(&path).await.unwrap(), 1);
        let record = restored.user(7).await;
        assert_eq!(record.settings.chat_id, Some(-1001));
        assert_eq!(record.settings.replace_words.len(), 1);
        assert_eq!(record.pending_input, None);
        assert!(restored.is_premium(7).await);
        assert!(restored.is_premium(1).await);
        assert_eq!(restored.session(7).await.as_deref(), Some("c2Vzc2lvbg=="));
    }

    #[tokio::test]
    async fn test_snapshot_without_sessions_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"users":{"3":{"chat_id":-5}},"premium":[]}"#).unwrap();

        let store = Store::new(1, &[]);
        assert_eq!(store.load(&path).await.unwrap(), 1);
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_session_reports_whether_one_existed() {
        let store = Store::new(1, &[]);
        assert!(!store.remove_session(4).await);
        store.save_session(4, "abc".into()).await;
        assert_eq!(store.session_count().await, 1);
        assert!(store.remove_session(4).await);
        assert_eq!(store.session(4).await, None);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(1, &[]);
        assert_eq!(store.load(&dir.path().join("none.json")).await.unwrap(), 0);
    }
}
