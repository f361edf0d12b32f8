// ABOUTME: Entry point for the shipwright CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use shipwright::config::{self, Config};
use shipwright::error::Result;
use shipwright::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    if let Err(e) = run(cli.command, mode).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(command: Commands, mode: OutputMode) -> Result<()> {
    let cwd = env::current_dir()?;
    let output = Output::new(mode);

    if let Commands::Init { force } = command {
        config::init_config(&cwd, force)?;
        output.success("Created shipwright.yml");
        return Ok(());
    }

    let config = Config::discover(&cwd)?;
    match command {
        Commands::Init { .. } => Ok(()),
        Commands::List { project } => commands::list(&config, project, output).await,
        Commands::History { id } => commands::history(&config, id, output).await,
        Commands::Migrate { dry_run } => commands::migrate(&config, dry_run, output).await,
        Commands::Validate => commands::validate(&config, output).await,
        Commands::RestoreBackup => commands::restore_backup(&config, output).await,
        Commands::Backup => commands::backup(&config, output).await,
    }
}
