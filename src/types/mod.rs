// ABOUTME: Type-safe identifiers shared by the engine, stores, and migration.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod id;

pub use id::{DeploymentId, Id, LogEntryId, ProjectId};
