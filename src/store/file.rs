// ABOUTME: Directory-of-files deployment store.
// ABOUTME: Each record lives in <dir>/<id>.json as pretty-printed JSON.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::deploy::{DeploymentRecord, LogEntry};
use crate::types::{DeploymentId, ProjectId};

use super::{DeploymentStore, StoreError, StoreKind};

const RECORD_EXTENSION: &str = "json";

/// Stores one JSON document per deployment under a directory.
///
/// `append_log` is a read-modify-write of the whole document; there is no
/// protection against concurrent writers beyond a single process.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open the store, creating the directory if needed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Point at a directory without touching the filesystem.
    pub fn at(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `id`, or `None` if the id cannot name a file
    /// inside the store directory.
    fn record_path(&self, id: &DeploymentId) -> Option<PathBuf> {
        let id = id.as_str();
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return None;
        }
        Some(self.dir.join(format!("{id}.{RECORD_EXTENSION}")))
    }

    /// Record documents in directory-enumeration order.
    pub async fn record_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path
                .extension()
                .is_some_and(|ext| ext == RECORD_EXTENSION);
            if is_record && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Parse a single record document.
    pub async fn read_record_file(path: &Path) -> Result<DeploymentRecord, StoreError> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn read_record(&self, id: &DeploymentId) -> Result<Option<DeploymentRecord>, StoreError> {
        let Some(path) = self.record_path(id) else {
            return Ok(None);
        };
        match Self::read_record_file(&path).await {
            Ok(record) => Ok(Some(record)),
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_record(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.id).ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("deployment id cannot be used as a file name: {}", record.id),
            ))
        })?;
        let json = serde_json::to_string_pretty(record)?;

        // Write beside the target and rename so readers never see a torn document.
        let tmp = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl DeploymentStore for FileStore {
    fn kind(&self) -> StoreKind {
        StoreKind::File
    }

    async fn save_deployment(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        self.write_record(record).await
    }

    async fn get_deployment(
        &self,
        id: &DeploymentId,
    ) -> Result<Option<DeploymentRecord>, StoreError> {
        self.read_record(id).await
    }

    async fn list_deployments(
        &self,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        let mut records = Vec::new();
        for path in self.record_files().await? {
            match Self::read_record_file(&path).await {
                Ok(record) => {
                    if project_id.is_none_or(|p| &record.project_id == p) {
                        records.push(record);
                    }
                }
                Err(e) => {
                    tracing::warn!("skipping unreadable record {}: {}", path.display(), e);
                }
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn append_log(&self, id: &DeploymentId, entry: &LogEntry) -> Result<(), StoreError> {
        let mut record = self
            .read_record(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.logs.push(entry.clone());
        self.write_record(&record).await
    }

    async fn get_deployment_history(&self, id: &DeploymentId) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self
            .read_record(id)
            .await?
            .map(|record| record.logs)
            .unwrap_or_default())
    }
}
