// ABOUTME: Collaborator traits the engine drives: providers per target type and the builder.
// ABOUTME: ProviderRegistry is an explicit keyed collection owned by each engine.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::DeploymentId;

use super::error::ProviderError;
use super::record::{BuildResult, DeploymentRecord, DeploymentTarget, Project, TargetType};
use super::status::DeploymentStatus;

/// Outcome of a provider deploy call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderDeployment {
    pub success: bool,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl ProviderDeployment {
    pub fn succeeded(url: Option<String>) -> Self {
        Self {
            success: true,
            url,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            url: None,
            error: Some(error.into()),
        }
    }
}

/// Performs the actual provisioning for one kind of target.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provision the deployment described by `record`.
    async fn deploy(&self, record: &DeploymentRecord) -> Result<ProviderDeployment, ProviderError>;

    /// Authoritative remote status of a deployment.
    async fn status(&self, id: &DeploymentId) -> Result<DeploymentStatus, ProviderError>;

    /// Revert a deployment to `version`.
    async fn rollback(&self, id: &DeploymentId, version: &str) -> Result<(), ProviderError>;
}

/// Builds a project before it is handed to a provider.
#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(&self, project: &Project, target: &DeploymentTarget) -> BuildResult;
}

/// Providers keyed by target type.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<TargetType, Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("target_types", &self.target_types())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `target_type`, replacing any previous one.
    pub fn register(&mut self, target_type: TargetType, provider: Arc<dyn Provider>) -> &mut Self {
        if self.providers.insert(target_type, provider).is_some() {
            tracing::debug!("replaced provider for target type {}", target_type);
        }
        self
    }

    pub fn with(mut self, target_type: TargetType, provider: Arc<dyn Provider>) -> Self {
        self.register(target_type, provider);
        self
    }

    pub fn get(&self, target_type: TargetType) -> Option<Arc<dyn Provider>> {
        self.providers.get(&target_type).cloned()
    }

    pub fn contains(&self, target_type: TargetType) -> bool {
        self.providers.contains_key(&target_type)
    }

    /// Registered target types in a stable order.
    pub fn target_types(&self) -> Vec<TargetType> {
        let mut types: Vec<_> = self.providers.keys().copied().collect();
        types.sort_by_key(|t| t.to_string());
        types
    }
}
