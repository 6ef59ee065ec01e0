//! Errors raised while loading configuration and resolving paths.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// The server UI location cannot be turned into a server config.
    #[error("Invalid server location '{location}': {reason}")]
    ServerLocation {
        location: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The server UI location is not a URL at all.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Malformed config file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Home directory not found.
    #[error("Path error: {0}")]
    Path(String),
}

impl CoreError {
    pub(crate) fn server_location(location: &str, reason: impl Into<String>) -> Self {
        CoreError::ServerLocation {
            location: location.to_string(),
            reason: reason.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
