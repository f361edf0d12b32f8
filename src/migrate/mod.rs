// ABOUTME: Online migration of deployment records from the file store into SQLite.
// ABOUTME: Builds a temporary database, then swaps it into place with backup and restore.

mod backup;
mod error;

pub use backup::{
    backup_path, create_pre_rollback_backup, pre_rollback_backup_path, restore_backup, tmp_path,
};
pub use error::{FinalizeStage, MigrateError, MigrateErrorKind};

use parking_lot::Mutex;
use serde::Serialize;
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::diagnostics::{Diagnostics, Warning};
use crate::events::{EventBus, NamedEvent, Subscriber};
use crate::store::{DeploymentStore, FileStore, SqliteStore, StoreError};
use crate::types::DeploymentId;

use error::{FinalizeSnafu, OpenTempSnafu, ReadSourceSnafu};

/// Knobs for a migration run.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationOptions {
    /// Read and validate every source record but write nothing to the target.
    pub dry_run: bool,
    /// Fail after the backup is taken and before the swap. Models a crash
    /// during finalize.
    pub fail_before_swap: bool,
}

/// Counts reported by a migration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub migrated: usize,
    pub skipped: usize,
}

/// Result of checking a migrated database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub total: usize,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationEvent {
    /// A source file was parsed.
    Progress { file: PathBuf, id: DeploymentId },
    /// A source file could not be migrated; the run continues.
    Error { file: PathBuf, message: String },
    /// The run finished.
    Done(MigrationSummary),
}

impl NamedEvent for MigrationEvent {
    fn name(&self) -> &'static str {
        match self {
            MigrationEvent::Progress { .. } => "progress",
            MigrationEvent::Error { .. } => "error",
            MigrationEvent::Done(_) => "done",
        }
    }
}

enum FileOutcome {
    Migrated,
    Skipped,
}

/// Moves records from a file store into a SQLite database.
///
/// A run never overwrites a record whose id is already in the target, so it
/// can be repeated after a partial failure.
#[derive(Debug, Default)]
pub struct MigrationManager {
    events: EventBus<MigrationEvent>,
    diagnostics: Mutex<Diagnostics>,
}

impl MigrationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber<MigrationEvent>>) {
        self.events.subscribe(subscriber);
    }

    /// Non-fatal warnings from past runs (skipped files, backup cleanup).
    pub fn warnings(&self) -> Vec<Warning> {
        self.diagnostics.lock().warnings().to_vec()
    }

    /// Drain the collected warnings.
    pub fn take_warnings(&self) -> Vec<Warning> {
        self.diagnostics.lock().take()
    }

    /// Copy every record under `source_dir` into the database at `target`.
    ///
    /// The records are written into `<target>.tmp`, which is swapped into
    /// place only after every file was processed. If a target already exists
    /// it is copied to `<target>.bak` first and restored should the swap
    /// fail. A dry run only parses the source files and touches nothing on
    /// the target side, not even its parent directory.
    pub async fn migrate_file_to_sqlite(
        &self,
        source_dir: &Path,
        target: &Path,
        options: MigrationOptions,
    ) -> Result<MigrationSummary, MigrateError> {
        let source = FileStore::at(source_dir);
        let files = source
            .record_files()
            .await
            .context(ReadSourceSnafu { path: source_dir })?;
        let temp = if options.dry_run {
            None
        } else {
            Some(self.open_temp(target).await?)
        };

        tracing::info!(
            "migrating {} file(s) from {} to {}{}",
            files.len(),
            source_dir.display(),
            target.display(),
            if options.dry_run { " (dry run)" } else { "" }
        );

        let mut summary = MigrationSummary::default();
        for file in &files {
            match self.migrate_file(temp.as_ref(), file).await {
                Ok(FileOutcome::Migrated) => summary.migrated += 1,
                Ok(FileOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    self.diagnostics.lock().warn(Warning::migration_file(format!(
                        "failed to migrate {}: {}",
                        file.display(),
                        e
                    )));
                    self.events.publish(&MigrationEvent::Error {
                        file: file.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let Some(temp) = temp else {
            self.events.publish(&MigrationEvent::Done(summary));
            return Ok(summary);
        };

        self.finalize(temp, target, options).await?;
        self.events.publish(&MigrationEvent::Done(summary));
        tracing::info!(
            "migration complete: {} migrated, {} skipped",
            summary.migrated,
            summary.skipped
        );
        Ok(summary)
    }

    /// Count the records in the database at `target`.
    ///
    /// `valid` is false when the database cannot be opened or read, or lacks
    /// the deployment tables. The file is opened read-only and never created.
    pub async fn validate_migration(&self, target: &Path) -> ValidationReport {
        let store = match SqliteStore::open_read_only(target).await {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!("cannot open {} for validation: {}", target.display(), e);
                return ValidationReport {
                    total: 0,
                    valid: false,
                };
            }
        };

        match store.list_deployments(None).await {
            Ok(records) => ValidationReport {
                total: records.len(),
                valid: true,
            },
            Err(e) => {
                tracing::warn!("cannot read {} for validation: {}", target.display(), e);
                ValidationReport {
                    total: 0,
                    valid: false,
                }
            }
        }
    }

    /// Move `<target>.bak` back over `target`. Returns whether a restore happened.
    pub async fn restore_backup(&self, target: &Path) -> Result<bool, MigrateError> {
        restore_backup(target).await
    }

    /// Copy `target` to a timestamped backup before a manual rollback.
    pub async fn create_pre_rollback_backup(
        &self,
        target: &Path,
    ) -> Result<Option<PathBuf>, MigrateError> {
        create_pre_rollback_backup(target).await
    }

    /// Open `<target>.tmp`, seeded with the current target so a re-run sees
    /// what earlier runs already migrated.
    async fn open_temp(&self, target: &Path) -> Result<SqliteStore, MigrateError> {
        let tmp = tmp_path(target);
        backup::remove_if_exists(&tmp)
            .await
            .map_err(StoreError::from)
            .context(OpenTempSnafu { path: &tmp })?;

        if backup::exists(target).await.unwrap_or(false) {
            match tokio::fs::copy(target, &tmp).await {
                Ok(_) => match SqliteStore::open_existing(&tmp).await {
                    Ok(store) => return Ok(store),
                    Err(e) => {
                        tracing::warn!(
                            "existing target {} is not a readable database, starting empty: {}",
                            target.display(),
                            e
                        );
                        let _ = backup::remove_if_exists(&tmp).await;
                    }
                },
                Err(e) => {
                    tracing::warn!("cannot seed {} from {}: {}", tmp.display(), target.display(), e);
                    let _ = backup::remove_if_exists(&tmp).await;
                }
            }
        }

        match SqliteStore::open(&tmp).await {
            Ok(store) => Ok(store),
            Err(e) => {
                let _ = backup::remove_if_exists(&tmp).await;
                Err(e).context(OpenTempSnafu { path: tmp })
            }
        }
    }

    async fn migrate_file(
        &self,
        temp: Option<&SqliteStore>,
        file: &Path,
    ) -> Result<FileOutcome, StoreError> {
        let record = FileStore::read_record_file(file).await?;
        self.events.publish(&MigrationEvent::Progress {
            file: file.to_path_buf(),
            id: record.id.clone(),
        });

        let Some(temp) = temp else {
            return Ok(FileOutcome::Migrated);
        };
        if temp.contains(&record.id).await? {
            tracing::debug!("skipping {}: already in target", record.id);
            return Ok(FileOutcome::Skipped);
        }

        // One transaction writes the record together with its whole log.
        temp.save_deployment(&record).await?;
        Ok(FileOutcome::Migrated)
    }

    async fn finalize(
        &self,
        temp: SqliteStore,
        target: &Path,
        options: MigrationOptions,
    ) -> Result<(), MigrateError> {
        let tmp = temp.path().to_path_buf();
        temp.close()
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))
            .context(FinalizeSnafu {
                stage: FinalizeStage::CloseTemp,
            })?;

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context(FinalizeSnafu {
                    stage: FinalizeStage::PrepareDirectory,
                })?;
        }

        let backed_up = backup::backup_target(target).await?;

        let swapped = self.swap(&tmp, target, options).await;
        match swapped {
            Ok(()) => {
                if backed_up && let Err(e) = backup::remove_if_exists(&backup_path(target)).await {
                    self.diagnostics.lock().warn(Warning::backup(format!(
                        "failed to remove backup for {}: {}",
                        target.display(),
                        e
                    )));
                }
                Ok(())
            }
            Err(e) => {
                if backed_up {
                    match restore_backup(target).await {
                        Ok(_) => tracing::warn!(
                            "finalize failed, restored previous {}",
                            target.display()
                        ),
                        Err(restore_err) => {
                            self.diagnostics.lock().warn(Warning::backup(format!(
                                "failed to restore {} after finalize error: {}",
                                target.display(),
                                restore_err
                            )));
                        }
                    }
                }
                if let Err(remove_err) = backup::remove_if_exists(&tmp).await {
                    self.diagnostics.lock().warn(Warning::backup(format!(
                        "failed to remove {}: {}",
                        tmp.display(),
                        remove_err
                    )));
                }
                Err(e)
            }
        }
    }

    async fn swap(
        &self,
        tmp: &Path,
        target: &Path,
        options: MigrationOptions,
    ) -> Result<(), MigrateError> {
        if options.fail_before_swap {
            return Err(std::io::Error::other("simulated failure before swap")).context(
                FinalizeSnafu {
                    stage: FinalizeStage::Swap,
                },
            );
        }

        backup::remove_if_exists(target)
            .await
            .context(FinalizeSnafu {
                stage: FinalizeStage::Swap,
            })?;
        tokio::fs::rename(tmp, target)
            .await
            .context(FinalizeSnafu {
                stage: FinalizeStage::Swap,
            })?;
        Ok(())
    }
}
