use std::time::Duration;

use thiserror::Error;

use palaver_shared::ProtocolError;

/// Errors produced by the sync client and its transports.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection refused, DNS failure, reset, etc.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Server responded with status {0}")]
    Status(u16),

    /// The poll response body was not a valid event batch.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No response within the client-side deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The server keeps answering with entries at or below the cursor.
    #[error("Event batch made no progress past sequence {0}")]
    Stalled(u64),

    #[error("Invalid server URI: {0}")]
    InvalidServerUri(String),

    /// Presence could not be established within the configured attempts.
    #[error("Join failed after {attempts} attempts: {last_error}")]
    JoinFailed { attempts: u32, last_error: String },

    #[error("Sync client was cancelled")]
    Cancelled,

    #[error("Sync task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ClientError {
    /// Whether the failure came from the network rather than from the payload.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status(_) | Self::Timeout(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
