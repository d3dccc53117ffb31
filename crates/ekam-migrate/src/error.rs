//! Error type for `ekam-migrate`.

use std::path::PathBuf;

use ekam_core::identity::DocumentKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One duplicate group blocking a unique constraint, identified by its row
/// ids only — the shared identity number itself is deliberately omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupViolation {
  pub document_ids: Vec<i64>,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("decode error: {0}")]
  Decode(String),

  #[error("unknown migration step: {0:?}")]
  UnknownStep(String),

  #[error("no store configured for kind: {0}")]
  UnknownStore(DocumentKind),

  #[error("backup file not found: {0}")]
  MissingBackup(PathBuf),

  /// The unique-index step found pre-existing duplicates. The store was
  /// restored to its pre-step state; run the cleanup migrator first.
  #[error(
    "cannot apply unique constraint to {kind}: {} duplicate group(s) exist; \
     run cleanup first",
    violations.len()
  )]
  ConstraintViolation {
    kind:       DocumentKind,
    violations: Vec<GroupViolation>,
  },

  /// A live cleanup finished with duplicate groups still present. Completed
  /// groups are committed; re-running the cleanup is safe and resumes from
  /// the first unprocessed group.
  #[error("cleanup left {remaining} duplicate group(s) in {kind}; re-run to resume")]
  PartialFailure { kind: DocumentKind, remaining: usize },

  #[error("migration step changed the row count of {table}: {before} -> {after}")]
  RowCountChanged { table: String, before: i64, after: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
