//! Error types for Echotap

use std::io;
use thiserror::Error;

/// Result type for Echotap operations
pub type Result<T> = std::result::Result<T, EchotapError>;

/// Errors that can occur in Echotap
#[derive(Debug, Error)]
pub enum EchotapError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Request body too large
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Request carries more headers than allowed
    #[error("Too many headers: {count} exceeds limit of {limit}")]
    TooManyHeaders {
        /// Header count
        count: usize,
        /// Header limit
        limit: usize,
    },

    /// Malformed request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
