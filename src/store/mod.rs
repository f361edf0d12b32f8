// ABOUTME: Persistence abstraction for deployment records.
// ABOUTME: Two interchangeable backends: a directory of JSON files and a SQLite database.

mod error;
pub mod file;
pub mod sqlite;

pub use error::StoreError;
pub use file::FileStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::deploy::{DeploymentRecord, LogEntry};
use crate::types::{DeploymentId, ProjectId};

/// Which backend a store is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// One JSON document per record in a directory.
    #[default]
    File,
    /// A single SQLite database file.
    Database,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::File => f.write_str("file"),
            StoreKind::Database => f.write_str("database"),
        }
    }
}

/// Durable storage for deployment records.
///
/// Both backends implement this contract identically:
///
/// - `save_deployment` is an idempotent upsert keyed by id that fully
///   replaces the previous content, logs included.
/// - `get_deployment` returns `None` for unknown ids.
/// - `list_deployments` orders by `created_at` ascending.
/// - `append_log` fails with [`StoreError::NotFound`] for unknown ids and
///   leaves the store unchanged.
/// - `get_deployment_history` returns an empty list for unknown ids.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    async fn save_deployment(&self, record: &DeploymentRecord) -> Result<(), StoreError>;

    async fn get_deployment(
        &self,
        id: &DeploymentId,
    ) -> Result<Option<DeploymentRecord>, StoreError>;

    async fn list_deployments(
        &self,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<DeploymentRecord>, StoreError>;

    async fn append_log(&self, id: &DeploymentId, entry: &LogEntry) -> Result<(), StoreError>;

    async fn get_deployment_history(&self, id: &DeploymentId) -> Result<Vec<LogEntry>, StoreError>;
}

/// Build the store selected by configuration.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn DeploymentStore>, StoreError> {
    tracing::debug!("opening {} store", config.kind);
    match config.kind {
        StoreKind::File => Ok(Arc::new(FileStore::open(&config.directory).await?)),
        StoreKind::Database => Ok(Arc::new(SqliteStore::open(&config.database).await?)),
    }
}
