//! Error types for passlock

use thiserror::Error;

/// Result type alias for passlock operations
pub type Result<T> = std::result::Result<T, LockError>;

/// Errors raised while setting up a lock or talking to its stores.
///
/// Digit entry never produces one of these: attempt outcomes are reported
/// through [`crate::LockObserver`].
#[derive(Debug, Error)]
pub enum LockError {
    /// Configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Passcode or lockout store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for LockError {
    fn from(e: serde_json::Error) -> Self {
        LockError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for LockError {
    fn from(e: toml::de::Error) -> Self {
        LockError::Serialization(e.to_string())
    }
}
