// ABOUTME: Migration commands: migrate, validate, restore-backup, and backup.
// ABOUTME: Moves records from the configured file store into the configured database.

use std::sync::Arc;

use shipwright::config::Config;
use shipwright::error::{Error, Result};
use shipwright::events::SubscriberError;
use shipwright::migrate::{MigrationEvent, MigrationManager, MigrationOptions};
use shipwright::output::{Output, OutputMode};

/// Migrate the file store into the database.
pub async fn migrate(config: &Config, dry_run: bool, mut output: Output) -> Result<()> {
    output.start_timer();
    let dry_run = dry_run || config.migration.dry_run;

    let mut manager = MigrationManager::new();
    let mode = output.mode();
    manager.subscribe(Arc::new(
        move |event: &MigrationEvent| -> std::result::Result<(), SubscriberError> {
            let out = Output::new(mode);
            match event {
                MigrationEvent::Progress { file, id } => {
                    out.progress(&format!("  → {} ({})", id, file.display()));
                }
                MigrationEvent::Error { file, message } => {
                    out.warning(&format!("skipped {}: {}", file.display(), message));
                }
                MigrationEvent::Done(_) => {}
            }
            Ok(())
        },
    ));

    output.progress(&format!(
        "Migrating {} → {}{}",
        config.store.directory.display(),
        config.store.database.display(),
        if dry_run { " (dry run)" } else { "" }
    ));

    let options = MigrationOptions {
        dry_run,
        ..Default::default()
    };
    let summary = manager
        .migrate_file_to_sqlite(&config.store.directory, &config.store.database, options)
        .await?;

    output.item(
        &format!(
            "{} migrated, {} skipped",
            summary.migrated, summary.skipped
        ),
        &summary,
    );

    if !dry_run {
        let report = manager.validate_migration(&config.store.database).await;
        if !report.valid {
            return Err(Error::InvalidTarget(config.store.database.clone()));
        }
        output.progress(&format!("  ✓ {} deployment(s) in database", report.total));
    }

    output.success("Migration complete!");
    Ok(())
}

/// Check the database and count its records.
pub async fn validate(config: &Config, output: Output) -> Result<()> {
    let report = MigrationManager::new()
        .validate_migration(&config.store.database)
        .await;

    output.item(
        &format!(
            "{}: {} deployment(s), valid: {}",
            config.store.database.display(),
            report.total,
            report.valid
        ),
        &report,
    );

    if report.valid {
        Ok(())
    } else {
        Err(Error::InvalidTarget(config.store.database.clone()))
    }
}

/// Put the backup from a failed migration back in place.
pub async fn restore_backup(config: &Config, output: Output) -> Result<()> {
    let restored = MigrationManager::new()
        .restore_backup(&config.store.database)
        .await?;

    if restored {
        output.success(&format!("Restored {}", config.store.database.display()));
    } else if output.mode() != OutputMode::Json {
        output.success("No backup to restore");
    }
    Ok(())
}

/// Copy the database aside before a manual rollback.
pub async fn backup(config: &Config, output: Output) -> Result<()> {
    let backup = MigrationManager::new()
        .create_pre_rollback_backup(&config.store.database)
        .await?;

    match backup {
        Some(path) => output.success(&format!("Backup written to {}", path.display())),
        None => output.warning(&format!(
            "{} does not exist yet, nothing to back up",
            config.store.database.display()
        )),
    }
    Ok(())
}
