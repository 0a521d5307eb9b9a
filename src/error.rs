//! Error types for the notification feed.

use thiserror::Error;

/// Main error type for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    #[error("Unauthorized: status {status}")]
    Unauthorized { status: u16 },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Credential unavailable: {0}")]
    Credential(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Feed runtime shut down")]
    Shutdown,
}

impl FeedError {
    /// Whether the server rejected our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, FeedError::Unauthorized { .. })
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => FeedError::Unauthorized { status },
            _ => FeedError::Http { status },
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Decode(e.to_string())
    }
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
