//! Error types for caseai-client

use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level HTTP failure (connect, read, decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with an error status
    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Message from another session reached this session's transcript
    #[error("Message {message_id} belongs to another session")]
    ForeignMessage { message_id: i64 },

    /// The turn gate is closed: not awaiting input, or a clip is still queued
    #[error("Not the user's turn")]
    TurnNotOpen,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// 4xx from the server: retrying the same request will not help
    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::Api { status, .. } if (400..500).contains(status))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;
