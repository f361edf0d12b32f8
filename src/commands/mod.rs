// ABOUTME: Command module aggregator for the shipwright CLI.
// ABOUTME: Re-exports store inspection and migration command handlers.

mod inspect;
mod migrate;

pub use inspect::{history, list};
pub use migrate::{backup, migrate, restore_backup, validate};
