// ABOUTME: Deployment records, their lifecycle state machine, and the engine driving them.
// ABOUTME: Providers and builders are external collaborators behind narrow traits.

mod engine;
mod error;
mod events;
mod provider;
mod record;
mod status;

pub use engine::{DeployResult, DeploymentEngine};
pub use error::{DeployError, DeployErrorKind, ProviderError};
pub use events::DeploymentEvent;
pub use provider::{Builder, Provider, ProviderDeployment, ProviderRegistry};
pub use record::{
    BuildResult, DeploymentRecord, DeploymentTarget, LogEntry, LogLevel, Project, TargetType,
};
pub use status::{DeploymentStatus, ParseStatusError};
