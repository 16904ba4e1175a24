//! Error types for Maildrift

use thiserror::Error;

/// Main error type for Maildrift
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid sequence set: {0}")]
    InvalidRange(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Maildrift
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error should surface to the client as a command error
    /// rather than a server failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidRange(_) | Error::PermissionDenied(_))
    }
}
