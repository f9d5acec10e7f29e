//! HTTP server module.
//!
//! Plain HTTP serving the health check. TLS is left to the hosting platform.
//! The server shuts down gracefully on SIGTERM/SIGINT.

mod server;
mod shutdown;

pub use server::{bind, start_server, ServerError};
pub use shutdown::setup_shutdown_handler;
