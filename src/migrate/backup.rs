// ABOUTME: Sibling-file helpers for migration: .tmp, .bak, and pre-rollback backups.
// ABOUTME: Backups are written once and then either deleted or restored.

use chrono::{DateTime, SecondsFormat, Utc};
use snafu::ResultExt;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use super::error::{BackupSnafu, MigrateError, RestoreSnafu};

fn with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Where the temporary database is built (`<target>.tmp`).
pub fn tmp_path(target: &Path) -> PathBuf {
    with_suffix(target, ".tmp")
}

/// Where the pre-swap backup is kept (`<target>.bak`).
pub fn backup_path(target: &Path) -> PathBuf {
    with_suffix(target, ".bak")
}

/// `<target>.pre-rollback.<timestamp>.bak`, with `:` and `.` in the
/// timestamp replaced by `-` so the name is portable.
pub fn pre_rollback_backup_path(target: &Path, at: DateTime<Utc>) -> PathBuf {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    with_suffix(target, &format!(".pre-rollback.{stamp}.bak"))
}

pub(crate) async fn exists(path: &Path) -> io::Result<bool> {
    tokio::fs::try_exists(path).await
}

/// Remove `path`, treating a missing file as success.
pub(crate) async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Copy `target` to `<target>.bak` if it exists. Returns whether a backup was made.
pub(crate) async fn backup_target(target: &Path) -> Result<bool, MigrateError> {
    let backup = backup_path(target);
    if !exists(target).await.context(BackupSnafu { path: target })? {
        return Ok(false);
    }
    tokio::fs::copy(target, &backup)
        .await
        .context(BackupSnafu { path: target })?;
    tracing::debug!("backed up {} to {}", target.display(), backup.display());
    Ok(true)
}

/// Move `<target>.bak` back over `target`. Returns whether a restore happened.
pub async fn restore_backup(target: &Path) -> Result<bool, MigrateError> {
    let backup = backup_path(target);
    if !exists(&backup).await.context(RestoreSnafu { path: &backup })? {
        return Ok(false);
    }

    remove_if_exists(target)
        .await
        .context(RestoreSnafu { path: &backup })?;
    tokio::fs::rename(&backup, target)
        .await
        .context(RestoreSnafu { path: &backup })?;
    tracing::info!("restored {} from {}", target.display(), backup.display());
    Ok(true)
}

/// Copy the current target aside before an operator-driven rollback.
///
/// Returns the backup path, or `None` when there is no target yet.
pub async fn create_pre_rollback_backup(target: &Path) -> Result<Option<PathBuf>, MigrateError> {
    if !exists(target).await.context(BackupSnafu { path: target })? {
        return Ok(None);
    }

    let backup = pre_rollback_backup_path(target, Utc::now());
    tokio::fs::copy(target, &backup)
        .await
        .context(BackupSnafu { path: target })?;
    tracing::info!("created pre-rollback backup {}", backup.display());
    Ok(Some(backup))
}
