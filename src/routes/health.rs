//! Health check endpoint for container orchestration.
//!
//! Liveness check used by Docker `HEALTHCHECK` and hosting platforms. It also
//! reports queue and user counts so operators can see the bot is working.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Queued tasks that have not been cancelled
    pub queue: usize,
    /// Transfers in progress
    pub active: usize,
    pub users: usize,
    /// Premium users, owner included
    pub premium: usize,
    pub uptime_seconds: i64,
}

/// Health check handler.
///
/// Always answers 200 while the process can serve HTTP.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "alive",
        queue: state.queue.queued().await,
        active: state.queue.active_count().await,
        users: state.store.user_count().await,
        premium: state.store.premium_count().await,
        uptime_seconds: state.uptime_seconds(),
    })
}
