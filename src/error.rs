// ABOUTME: Application-wide error types for shipwright.
// ABOUTME: Uses thiserror to wrap config, store, deploy, and migration failures.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;
use crate::migrate::MigrateError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("migration target is not valid: {0}")]
    InvalidTarget(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Migrate(#[from] MigrateError),
}

pub type Result<T> = std::result::Result<T, Error>;
