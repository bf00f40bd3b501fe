//! Error types for dockhand

use thiserror::Error;

/// Main error type for dockhand
#[derive(Error, Debug)]
pub enum DockhandError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Git error: {0}")]
    GitError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Credential error: {0}")]
    CredentialError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DockhandError {
    /// Prefix the error message with operation context, keeping the variant.
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        match self {
            DockhandError::ValidationError(m) => {
                DockhandError::ValidationError(format!("{}: {}", context, m))
            }
            DockhandError::NotFound(m) => DockhandError::NotFound(format!("{}: {}", context, m)),
            DockhandError::GitError(m) => DockhandError::GitError(format!("{}: {}", context, m)),
            DockhandError::RuntimeError(m) => {
                DockhandError::RuntimeError(format!("{}: {}", context, m))
            }
            DockhandError::PersistenceError(m) => {
                DockhandError::PersistenceError(format!("{}: {}", context, m))
            }
            DockhandError::CredentialError(m) => {
                DockhandError::CredentialError(format!("{}: {}", context, m))
            }
            DockhandError::ConfigError(m) => {
                DockhandError::ConfigError(format!("{}: {}", context, m))
            }
            DockhandError::ServerError(m) => {
                DockhandError::ServerError(format!("{}: {}", context, m))
            }
            DockhandError::ShutdownError(m) => {
                DockhandError::ShutdownError(format!("{}: {}", context, m))
            }
            DockhandError::Internal(m) => DockhandError::Internal(format!("{}: {}", context, m)),
            other => DockhandError::Internal(format!("{}: {}", context, other)),
        }
    }
}

impl From<git2::Error> for DockhandError {
    fn from(err: git2::Error) -> Self {
        DockhandError::GitError(err.message().to_string())
    }
}

impl From<anyhow::Error> for DockhandError {
    fn from(err: anyhow::Error) -> Self {
        DockhandError::Internal(err.to_string())
    }
}
