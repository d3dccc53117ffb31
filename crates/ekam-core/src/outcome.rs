//! Ingestion outcomes, conflict information, and duplicate reporting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::DocumentKind;

// ─── ConflictInfo ────────────────────────────────────────────────────────────

/// Where an identity number already exists. Deliberately excludes the number
/// itself and any extracted fields so no PII can leak through error channels
/// or API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictInfo {
  pub kind:        DocumentKind,
  /// The user the existing record belongs to, when known.
  pub user_id:     Option<Uuid>,
  /// The existing document row, when the conflict came from a per-kind
  /// store rather than the registry.
  pub document_id: Option<i64>,
  pub ingested_at: DateTime<Utc>,
}

// ─── Uniqueness ──────────────────────────────────────────────────────────────

/// Result of the non-authoritative pre-check against the per-kind store and
/// the registry. The storage unique constraint remains the final arbiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "uniqueness", content = "conflict", rename_all = "snake_case")]
pub enum Uniqueness {
  Unique,
  Conflict(ConflictInfo),
}

impl Uniqueness {
  pub fn is_unique(&self) -> bool {
    matches!(self, Uniqueness::Unique)
  }
}

// ─── Store-level write outcomes ──────────────────────────────────────────────

/// Outcome of a document insert attempted against the unique index.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
  Inserted(crate::document::DocumentRecord),
  /// The unique constraint fired; `conflict` describes the winning row,
  /// re-read inside the same store call.
  Conflict(ConflictInfo),
}

/// Outcome of a cross-reference link attempt.
#[derive(Debug, Clone)]
pub enum LinkOutcome {
  /// The link row exists and points at the requested document. Re-linking
  /// the same document is an idempotent no-op that still reports `Linked`.
  Linked(crate::link::CrossReference),
  /// A link for `(user_id, kind)` already points at a different document —
  /// a policy violation, not a storage error.
  AlreadyLinked { existing: crate::link::CrossReference },
}

// ─── IngestOutcome ───────────────────────────────────────────────────────────

/// What the ingestion pipeline reports back to the request-handling layer.
/// Duplicates and rejections are normal outcomes, not errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
  /// A new user was created and the document stored and linked.
  Created { user_id: Uuid, document_id: i64 },
  /// The document was stored and linked to an existing user.
  Linked { user_id: Uuid, document_id: i64 },
  /// The identity number already exists somewhere in the system.
  Duplicate { conflict: ConflictInfo },
  /// The input was rejected (bad format, second document of a kind).
  Rejected { reason: String },
}

// ─── Duplicate report ────────────────────────────────────────────────────────

/// Per-store duplicate and data-quality counts, grouped on the normalized
/// identity number. Read-only analytics; safe to run anytime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetrics {
  pub kind:             DocumentKind,
  pub total_rows:       i64,
  pub unique_numbers:   i64,
  /// Numbers appearing more than once.
  pub duplicate_groups: i64,
  /// Rows belonging to a duplicate group.
  pub duplicate_rows:   i64,
}

impl StoreMetrics {
  /// Percentage of rows that are redundant copies within some group.
  pub fn duplicate_percentage(&self) -> f64 {
    if self.total_rows == 0 {
      return 0.0;
    }
    (self.total_rows - self.unique_numbers) as f64 / self.total_rows as f64 * 100.0
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateReport {
  pub generated_at: DateTime<Utc>,
  pub stores:       Vec<StoreMetrics>,
}

impl DuplicateReport {
  pub fn total_duplicate_groups(&self) -> i64 {
    self.stores.iter().map(|m| m.duplicate_groups).sum()
  }
}
