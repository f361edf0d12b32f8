// ABOUTME: Error types for deployment engine operations.
// ABOUTME: Covers unknown providers, illegal state changes, and build/deploy/rollback failures.

use super::record::TargetType;
use super::status::DeploymentStatus;
use crate::types::DeploymentId;

/// Errors that can occur during deployment state transitions.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// No provider is registered for the target type.
    #[error("no provider registered for target type '{0}'")]
    ProviderNotFound(TargetType),

    /// The operation is not allowed from the record's current status.
    #[error("cannot {operation} deployment {id} in status {status}")]
    InvalidState {
        id: DeploymentId,
        status: DeploymentStatus,
        operation: &'static str,
    },

    /// Build collaborator reported failure.
    #[error("build failed: {0}")]
    BuildFailed(String),

    /// Provider failed to deploy.
    #[error("deploy failed: {0}")]
    DeployFailed(String),

    /// Provider failed to roll back.
    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    /// The deployment was cancelled while in flight.
    #[error("deployment {0} was cancelled")]
    Cancelled(DeploymentId),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    ProviderNotFound,
    InvalidState,
    BuildFailed,
    DeployFailed,
    RollbackFailed,
    Cancelled,
}

impl DeployError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::ProviderNotFound(_) => DeployErrorKind::ProviderNotFound,
            DeployError::InvalidState { .. } => DeployErrorKind::InvalidState,
            DeployError::BuildFailed(_) => DeployErrorKind::BuildFailed,
            DeployError::DeployFailed(_) => DeployErrorKind::DeployFailed,
            DeployError::RollbackFailed(_) => DeployErrorKind::RollbackFailed,
            DeployError::Cancelled(_) => DeployErrorKind::Cancelled,
        }
    }

    pub(crate) fn invalid_state(
        id: &DeploymentId,
        status: DeploymentStatus,
        operation: &'static str,
    ) -> Self {
        DeployError::InvalidState {
            id: id.clone(),
            status,
            operation,
        }
    }
}

/// Errors reported by a provider implementation.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("deployment not known to provider: {0}")]
    UnknownDeployment(String),

    #[error("{0}")]
    Failed(String),
}
