// ABOUTME: Diagnostics accumulator for non-fatal warnings.
// ABOUTME: Collects persistence and migration problems that must not fail the operation itself.

/// Collects non-fatal warnings during engine and migration operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Drain collected warnings, leaving the accumulator empty.
    pub fn take(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

/// A non-fatal warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A record state could not be written to the store.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Persistence,
            message: message.into(),
        }
    }

    /// One source file could not be migrated.
    pub fn migration_file(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::MigrationFile,
            message: message.into(),
        }
    }

    /// A backup could not be restored or cleaned up.
    pub fn backup(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Backup,
            message: message.into(),
        }
    }
}

/// Categories of non-fatal warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Saving a record failed; the in-memory state is ahead of the store.
    Persistence,
    /// A source record was skipped during migration.
    MigrationFile,
    /// Backup restore or cleanup failed.
    Backup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_and_drains_warnings() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::persistence("disk full"));
        diag.warn(Warning::migration_file("bad json"));

        assert!(diag.has_warnings());
        assert_eq!(diag.warnings().len(), 2);

        let drained = diag.take();
        assert_eq!(drained.len(), 2);
        assert!(!diag.has_warnings());
    }

    #[test]
    fn warning_constructors_set_correct_kind() {
        assert_eq!(Warning::persistence("x").kind, WarningKind::Persistence);
        assert_eq!(Warning::migration_file("x").kind, WarningKind::MigrationFile);
        assert_eq!(Warning::backup("x").kind, WarningKind::Backup);
    }
}
