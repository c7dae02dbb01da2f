//! Common error types for CaseAI

use thiserror::Error;

/// Common result type for CaseAI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the CaseAI services
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed identifier, empty content or other rejected input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Change notification channel closed or unusable
    #[error("Notification channel error: {0}")]
    NotificationChannel(String),

    /// Speech synthesis provider failure
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Speech transcription provider failure
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// External call exceeded its time bound
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Provider not configured (e.g. missing API key)
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors a caller can fix by changing the request
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::NotFound(_))
    }
}
