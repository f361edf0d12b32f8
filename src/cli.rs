// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "shipwright")]
#[command(about = "Deployment records, stores, and store migration")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new shipwright.yml configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// List deployments in the configured store
    List {
        /// Only show deployments of this project
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Show the log history of a deployment
    History {
        /// Deployment ID
        id: String,
    },

    /// Migrate deployment records from the file store into the database
    Migrate {
        /// Read and validate records without writing the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Check that the database can be opened and count its records
    Validate,

    /// Restore the database from the backup left by a failed migration
    RestoreBackup,

    /// Copy the database to a timestamped backup before a manual rollback
    Backup,
}
