// error.rs - Centralized error handling using thiserror

use serde::{Deserialize, Serialize};

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sync engine
///
/// Uses thiserror for ergonomic error handling and automatic Display impl.
/// All errors are serializable for safe transmission to the UI layer.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("Offline context error: {0}")]
    OfflineContext(String),

    #[error("Offline storage error: {0}")]
    OfflineStorage(String),

    #[error("Storage quota error: {0}")]
    StorageQuota(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Version conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Whether a drain failure should consume retry budget.
    ///
    /// Conflicts are recorded through the conflict store instead, and
    /// identity failures reject the whole drain pass up front.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::NetworkTimeout(_) | Error::Sync(_)
        )
    }
}

// Implement conversions from common error types
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::NetworkTimeout(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}
