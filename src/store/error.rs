// ABOUTME: Error types shared by the deployment store backends.
// ABOUTME: Distinguishes missing records from unavailable backends and I/O failures.

use std::path::PathBuf;

use crate::types::DeploymentId;

/// Errors returned by a `DeploymentStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record with the given id exists.
    #[error("deployment not found: {0}")]
    NotFound(DeploymentId),

    /// The database backend could not be opened or initialized.
    #[error("backend unavailable at {}: {reason}", path.display())]
    BackendUnavailable { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A blocking database task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn backend_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StoreError::BackendUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}
