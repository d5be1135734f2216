//! Core error types for pomosync-core.
//!
//! Nothing in the timer subsystem is fatal: these errors surface from the
//! storage and recording collaborators and are logged and absorbed by the
//! synchronizer and the recording worker. Only configuration and CLI paths
//! propagate them to the user.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for pomosync-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistence backend errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Recording collaborator errors
    #[error("Recording error: {0}")]
    Record(#[from] RecordError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database errors outside the timer store
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Errors raised by a [`PersistenceAdapter`](crate::persistence::PersistenceAdapter).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The remote store rejected our credentials (HTTP 401).
    #[error("Remote store rejected credentials")]
    Unauthorized,

    /// No credentials are available for the remote store.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Transport-level failure talking to the remote store.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store answered with an unexpected status.
    #[error("Remote store returned HTTP {0}")]
    Status(u16),

    /// Local SQLite failure.
    #[error("Local store error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored value could not be decoded.
    #[error("Corrupt value for '{key}': {value}")]
    Corrupt { key: String, value: String },

    #[error("Invalid remote URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors raised by a [`RecordingClient`](crate::recording::RecordingClient).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// HTTP 401: credentials expired.
    #[error("Unauthorized")]
    Unauthorized,

    /// The request never reached the server.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered but refused the record.
    #[error("Rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl RecordError {
    /// Whether a failed recording should be queued for a later retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RecordError::Rejected { status, .. } if *status < 500 && *status != 408 && *status != 429)
    }
}

impl From<reqwest::Error> for RecordError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status == reqwest::StatusCode::UNAUTHORIZED => RecordError::Unauthorized,
            Some(status) => RecordError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => RecordError::Network(err.to_string()),
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Home/config directory could not be prepared
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_and_network_are_retryable() {
        assert!(RecordError::Unauthorized.is_retryable());
        assert!(RecordError::Network("connection refused".into()).is_retryable());
    }

    #[test]
    fn client_rejections_are_not_retryable() {
        let bad_request = RecordError::Rejected {
            status: 400,
            message: "bad payload".into(),
        };
        assert!(!bad_request.is_retryable());

        let server_error = RecordError::Rejected {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(server_error.is_retryable());
    }
}
