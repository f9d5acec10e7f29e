//! RATNA: a Telegram relay bot.
//!
//! Copies media posts from channels and groups into a chat chosen by each
//! user, applying their rename, caption and word rules. Users can log in with
//! their own account to reach private channels. A small HTTP server exposes a
//! health endpoint for container hosting.

pub mod account;
pub mod bot;
pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod queue;
pub mod relay;
pub mod routes;
pub mod state;
pub mod store;
pub mod telegram;

pub use error::AppError;
