//! Shared application state for request handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::queue::RelayQueue;
use crate::store::Store;

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
///
/// The store and queue are the same instances the bot and relay workers use,
/// so the health endpoint reports live numbers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub queue: RelayQueue,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<Store>, queue: RelayQueue) -> Self {
        Self {
            store,
            queue,
            started_at: Utc::now(),
        }
    }

    /// Whole seconds since the state was created
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }
}
