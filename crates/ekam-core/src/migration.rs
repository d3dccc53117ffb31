//! Migration audit types shared between the maintenance tooling and the
//! administrative API.
//!
//! A [`MigrationRun`] is created when a schema or cleanup migration starts
//! and transitions out of `Pending` exactly once. Runs are retained
//! indefinitely as an audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Mode & status ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationMode {
  /// Plan and report only; no mutation.
  DryRun,
  Live,
}

impl MigrationMode {
  pub fn as_str(self) -> &'static str {
    match self {
      MigrationMode::DryRun => "dry_run",
      MigrationMode::Live => "live",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
  Pending,
  Succeeded,
  Failed,
  RolledBack,
}

impl MigrationStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      MigrationStatus::Pending => "pending",
      MigrationStatus::Succeeded => "succeeded",
      MigrationStatus::Failed => "failed",
      MigrationStatus::RolledBack => "rolled_back",
    }
  }
}

// ─── Run record ──────────────────────────────────────────────────────────────

/// Audit/recovery record for one migrator execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRun {
  pub run_id:           Uuid,
  /// Which store the run operated on (e.g. `"aadhaar"`, `"registry"`).
  pub target:           String,
  /// Stable operation or step identifier (e.g. `"cleanup"`,
  /// `"add-identity-unique-index"`).
  pub operation:        String,
  pub mode:             MigrationMode,
  pub started_at:       DateTime<Utc>,
  pub completed_at:     Option<DateTime<Utc>>,
  /// Path of the pre-migration backup, when one was taken.
  pub backup_reference: Option<String>,
  pub status:           MigrationStatus,
  /// Operation-specific counts and per-group detail, as JSON.
  pub summary:          serde_json::Value,
}

// ─── Cleanup summary ─────────────────────────────────────────────────────────

/// How one duplicate group was (or would be) resolved. Losing rows are gone
/// for good in live mode, so the ids are recorded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupResolution {
  pub surviving_document_id: i64,
  pub removed_document_ids:  Vec<i64>,
}

/// The `summary` payload of a cleanup run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupSummary {
  pub groups_found:         usize,
  pub groups_resolved:      usize,
  pub rows_removed:         usize,
  pub crossrefs_repointed:  usize,
  pub groups:               Vec<GroupResolution>,
}

// ─── Verification ────────────────────────────────────────────────────────────

/// Result of re-reading the schema after (or before) a migration step and
/// comparing it against the step's expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
  pub step:    String,
  /// Expectations that are not satisfied; empty means the step verifies.
  pub missing: Vec<String>,
}

impl VerificationResult {
  pub fn ok(&self) -> bool {
    self.missing.is_empty()
  }
}
