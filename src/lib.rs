// ABOUTME: Library root for shipwright - deployment lifecycle, stores, and migration.
// ABOUTME: The CLI binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod migrate;
pub mod output;
pub mod store;
pub mod types;
