//! Common error types for emofuse

use thiserror::Error;

/// Common result type for emofuse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by the engine and its adapters
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input (bad config patch, malformed request)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal inconsistency detected during a computation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
