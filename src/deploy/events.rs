// ABOUTME: Lifecycle events emitted by the deployment engine.
// ABOUTME: Delivered synchronously to subscribers after each state mutation.

use crate::events::NamedEvent;
use crate::types::DeploymentId;

use super::record::LogEntry;
use super::status::DeploymentStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum DeploymentEvent {
    DeploymentStarted {
        id: DeploymentId,
    },
    StatusUpdated {
        id: DeploymentId,
        from: DeploymentStatus,
        to: DeploymentStatus,
    },
    LogAdded {
        id: DeploymentId,
        entry: LogEntry,
    },
    DeploymentCompleted {
        id: DeploymentId,
        url: Option<String>,
    },
    DeploymentFailed {
        id: DeploymentId,
        error: String,
    },
    RollbackCompleted {
        id: DeploymentId,
        from_version: String,
        to_version: String,
    },
    RollbackFailed {
        id: DeploymentId,
        error: String,
    },
    DeploymentCancelled {
        id: DeploymentId,
    },
}

impl DeploymentEvent {
    pub fn deployment_id(&self) -> &DeploymentId {
        match self {
            DeploymentEvent::DeploymentStarted { id }
            | DeploymentEvent::StatusUpdated { id, .. }
            | DeploymentEvent::LogAdded { id, .. }
            | DeploymentEvent::DeploymentCompleted { id, .. }
            | DeploymentEvent::DeploymentFailed { id, .. }
            | DeploymentEvent::RollbackCompleted { id, .. }
            | DeploymentEvent::RollbackFailed { id, .. }
            | DeploymentEvent::DeploymentCancelled { id } => id,
        }
    }
}

impl NamedEvent for DeploymentEvent {
    fn name(&self) -> &'static str {
        match self {
            DeploymentEvent::DeploymentStarted { .. } => "deploymentStarted",
            DeploymentEvent::StatusUpdated { .. } => "statusUpdated",
            DeploymentEvent::LogAdded { .. } => "logAdded",
            DeploymentEvent::DeploymentCompleted { .. } => "deploymentCompleted",
            DeploymentEvent::DeploymentFailed { .. } => "deploymentFailed",
            DeploymentEvent::RollbackCompleted { .. } => "rollbackCompleted",
            DeploymentEvent::RollbackFailed { .. } => "rollbackFailed",
            DeploymentEvent::DeploymentCancelled { .. } => "deploymentCancelled",
        }
    }
}
