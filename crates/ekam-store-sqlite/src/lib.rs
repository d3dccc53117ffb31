//! SQLite backends for the Ekam identity registry and per-kind document
//! stores.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime.

mod documents;
mod encode;
mod registry;
mod schema;

pub mod error;

pub use documents::SqliteDocumentStore;
pub use error::{Error, Result};
pub use registry::SqliteRegistry;
pub use schema::{DOCUMENTS_SCHEMA, IDENTITY_UNIQUE_INDEX, REGISTRY_SCHEMA};

#[cfg(test)]
mod tests;
