//! Errors surfaced by workbench actions.

use thiserror::Error;

/// Input checks performed before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing token")]
    MissingToken,
    #[error("Query is required")]
    EmptyQuery,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("No query result to export")]
    NoResult,
    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
    #[error("failed to write export: {0}")]
    Write(String),
}

/// Failure of a user-triggered action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Capture(String),
    #[error("{0}")]
    Network(String),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("storage failed: {0}")]
    Storage(String),
    #[error("another action is still running")]
    Busy,
}

impl ClientError {
    pub fn capture(message: impl Into<String>) -> Self {
        ClientError::Capture(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        ClientError::Network(message.into())
    }

    /// Wrap a storage failure, keeping the full context chain.
    pub fn storage(err: anyhow::Error) -> Self {
        ClientError::Storage(format!("{err:#}"))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }
}
