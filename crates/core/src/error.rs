//! Error types shared by crates that have no more specific error of their own.

use thiserror::Error;

/// Errors that can occur while building or validating daemon configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A required configuration value was missing or malformed.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The auth token file could not be read.
    #[error("failed to read auth token file {path}: {reason}")]
    AuthTokenFile { path: String, reason: String },
}

/// Convenience alias for this crate's fallible operations.
pub type CoreResult<T> = Result<T, CoreError>;
