//! Contracts of the analytics server client.
//!
//! The transport itself (HTTP, TLS, serialization) lives with the host; the
//! dispatcher only needs configuration validation, a relevance query and an
//! upload primitive, each with a typed failure.

use async_trait::async_trait;
use dispatcher_config_and_utils::ServerConfig;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Batch-wide failure raised while validating the server configuration.
///
/// All three kinds are handled identically by the dispatcher: the whole
/// batch is deferred behind a quiet period.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A session could not be established.
    #[error("Session establishment failed: {0}")]
    SessionEstablishment(String),

    /// The configured shared space does not exist.
    #[error("Shared space not found: {0}")]
    WorkspaceNotFound(String),
}

impl ConnectivityError {
    /// Short tag for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectivityError::Authentication(_) => "authentication",
            ConnectivityError::SessionEstablishment(_) => "session",
            ConnectivityError::WorkspaceNotFound(_) => "workspace",
        }
    }
}

/// Per-request failure raised by relevance checks and uploads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The server is busy; retry later.
    #[error("Server temporarily unavailable: {0}")]
    TemporarilyUnavailable(String),

    /// Any other request failure.
    #[error("Request failed: {0}")]
    Request(String),
}

/// Client for one configured analytics server.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Check credentials, session establishment and shared space existence.
    async fn validate_configuration(&self) -> Result<(), ConnectivityError>;

    /// Whether results of `project_name` should be sent from this host.
    async fn is_result_relevant(
        &self,
        server_identity: &str,
        project_name: &str,
    ) -> Result<bool, RemoteError>;

    /// Upload a result file, returning the server-side id of the upload.
    ///
    /// `is_retry` is passed through to the server untouched.
    async fn post_result(&self, result_file: &Path, is_retry: bool) -> Result<i64, RemoteError>;
}

/// Hands out clients keyed by server location, shared space and credentials.
pub trait RemoteClientFactory: Send + Sync {
    fn obtain(&self, server: &ServerConfig) -> Arc<dyn RemoteClient>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_error_kinds() {
        assert_eq!(
            ConnectivityError::Authentication("bad".into()).kind(),
            "authentication"
        );
        assert_eq!(
            ConnectivityError::SessionEstablishment("x".into()).kind(),
            "session"
        );
        assert_eq!(
            ConnectivityError::WorkspaceNotFound("1001".into()).kind(),
            "workspace"
        );
    }

    #[test]
    fn error_display() {
        let err = RemoteError::TemporarilyUnavailable("Server busy".to_string());
        assert_eq!(err.to_string(), "Server temporarily unavailable: Server busy");

        let err = ConnectivityError::WorkspaceNotFound("1001".to_string());
        assert_eq!(err.to_string(), "Shared space not found: 1001");
    }
}
