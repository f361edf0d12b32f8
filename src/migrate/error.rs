// ABOUTME: Migration error types with the SNAFU pattern.
// ABOUTME: Finalize failures carry the stage that failed so callers know what was restored.

use snafu::Snafu;
use std::fmt;
use std::path::PathBuf;

use crate::store::StoreError;

/// Step of the finalize (swap) sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeStage {
    /// Creating the target's parent directory.
    PrepareDirectory,
    /// Closing the temporary database before it is moved.
    CloseTemp,
    /// Removing the old target and moving the temporary database into place.
    Swap,
}

impl fmt::Display for FinalizeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizeStage::PrepareDirectory => f.write_str("prepare directory"),
            FinalizeStage::CloseTemp => f.write_str("close temporary database"),
            FinalizeStage::Swap => f.write_str("swap"),
        }
    }
}

/// Errors from migrating, validating, or restoring a database target.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MigrateError {
    #[snafu(display("cannot read source directory {}: {source}", path.display()))]
    ReadSource {
        path: PathBuf,
        source: StoreError,
    },

    #[snafu(display("cannot open temporary database {}: {source}", path.display()))]
    OpenTemp {
        path: PathBuf,
        source: StoreError,
    },

    #[snafu(display("migration finalize failed during {stage}: {source}"))]
    Finalize {
        stage: FinalizeStage,
        source: std::io::Error,
    },

    #[snafu(display("cannot back up {}: {source}", path.display()))]
    Backup {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot restore backup {}: {source}", path.display()))]
    Restore {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateErrorKind {
    /// Source directory missing or unreadable.
    SourceUnreadable,
    /// Temporary database could not be opened.
    BackendUnavailable,
    /// The swap into place failed; the previous target was restored if possible.
    Finalize,
    /// Copying the current target aside failed.
    Backup,
    /// Moving a backup back into place failed.
    Restore,
}

impl MigrateError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> MigrateErrorKind {
        match self {
            MigrateError::ReadSource { .. } => MigrateErrorKind::SourceUnreadable,
            MigrateError::OpenTemp { .. } => MigrateErrorKind::BackendUnavailable,
            MigrateError::Finalize { .. } => MigrateErrorKind::Finalize,
            MigrateError::Backup { .. } => MigrateErrorKind::Backup,
            MigrateError::Restore { .. } => MigrateErrorKind::Restore,
        }
    }

    /// The finalize stage that failed, if this is a finalize error.
    pub fn finalize_stage(&self) -> Option<FinalizeStage> {
        match self {
            MigrateError::Finalize { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
