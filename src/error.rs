//! Error types for the Floodgate service.

use std::time::Duration;
use thiserror::Error;

/// Main error type for Floodgate operations.
///
/// A denied call is not an error of this kind; see [`LimitExceeded`].
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for FloodgateError {
    fn from(err: config::ConfigError) -> Self {
        FloodgateError::Config(err.to_string())
    }
}

/// The caller already used up its allowance for the current window.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("limit exceeded")]
pub struct LimitExceeded {
    /// Time until the oldest counted call leaves the window
    pub retry_after: Duration,
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
