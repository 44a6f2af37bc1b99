//! Error types for Lockgate

use thiserror::Error;

/// Result type alias for Lockgate operations
pub type Result<T> = std::result::Result<T, LockgateError>;

/// Errors that can occur outside the login state machine itself
///
/// Login outcomes (offline, bad credentials, lockout) are state, not errors.
#[derive(Debug, Error)]
pub enum LockgateError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential store error
    #[error("Store error: {0}")]
    Store(String),

    /// Connectivity probe error
    #[error("Connectivity error: {0}")]
    Connectivity(String),
}

impl From<serde_json::Error> for LockgateError {
    fn from(e: serde_json::Error) -> Self {
        LockgateError::Serialization(e.to_string())
    }
}
