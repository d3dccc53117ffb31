//! Out-of-band maintenance for the Ekam stores: schema evolution and
//! duplicate cleanup.
//!
//! Everything here runs synchronously over plain [`rusqlite`] connections
//! and requires exclusive access to its target store for the duration of a
//! step — no concurrent online ingestion against a store mid-migration.
//! Every execution is recorded in the registry's `migration_runs` audit
//! table.

mod backup;
mod runs;
mod scan;

pub mod cleanup;
pub mod error;
pub mod schema;

pub use backup::{create_backup, restore_backup};
pub use cleanup::CleanupMigrator;
pub use error::{Error, GroupViolation, Result};
pub use runs::RunLog;
pub use schema::{SchemaMigrator, SchemaStep, StepState};

#[cfg(test)]
mod tests;
