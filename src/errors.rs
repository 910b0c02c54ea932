use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Snapshot invalid: {0}")]
    SnapshotInvalid(String),

    #[error("Streaming session unavailable: {0}")]
    StreamingUnavailable(String),

    #[error("Streaming authentication error: {0}")]
    StreamingAuth(String),

    #[error("Playback command failed: {0}")]
    PlaybackCommand(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Expired/invalid credentials are the only adapter failure surfaced to
    /// callers as user-actionable; everything else is recovered in place.
    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::StreamingAuth(_))
    }
}

// Implement From traits for common error types to simplify conversion

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Storage(format!("Serialization error: {}", e))
    }
}
