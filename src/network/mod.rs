//! Network layer for Echotap
//!
//! TCP accept loop, bounded concurrency, and HTTP helpers.

mod connection_pool;
mod handler;
mod http;

pub use connection_pool::{ConnectionGuard, ConnectionPool};
pub use handler::NetworkHandler;
pub use http::{HttpHandler, ResponseBody};

/// Graceful shutdown timeout
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;
