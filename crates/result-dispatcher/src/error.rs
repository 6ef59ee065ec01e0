//! Dispatcher error types.

use thiserror::Error;

/// Dispatcher error type.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// IO error (audit file, result file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] dispatcher_config_and_utils::CoreError),

    /// Audit log error
    #[error("Audit error: {0}")]
    Audit(String),
}

/// Result type alias using DispatchError.
pub type DispatchResult<T> = Result<T, DispatchError>;
