//! Persistence for [`MigrationRun`] audit records.
//!
//! Runs live in the registry database's `migration_runs` table and are never
//! deleted. A run transitions out of `Pending` exactly once, via
//! [`RunLog::finish`].

use std::path::Path;

use chrono::Utc;
use ekam_core::migration::{MigrationMode, MigrationRun, MigrationStatus};
use uuid::Uuid;

use crate::{Error, Result};

/// Matches the `migration_runs` definition in the registry schema; kept
/// separate so the run log works before the full registry schema exists.
const RUNS_DDL: &str = "
CREATE TABLE IF NOT EXISTS migration_runs (
    run_id           TEXT PRIMARY KEY,
    target           TEXT NOT NULL,
    operation        TEXT NOT NULL,
    mode             TEXT NOT NULL,
    started_at       TEXT NOT NULL,
    completed_at     TEXT,
    backup_reference TEXT,
    status           TEXT NOT NULL,
    summary          TEXT NOT NULL DEFAULT '{}'
);
";

pub struct RunLog {
  conn: rusqlite::Connection,
}

impl RunLog {
  /// Open the run log on the registry database, creating the table if this
  /// is the first migration ever executed.
  pub fn open(registry_path: &Path) -> Result<Self> {
    let conn = rusqlite::Connection::open(registry_path)?;
    conn.execute_batch(RUNS_DDL)?;
    Ok(Self { conn })
  }

  /// Record the start of a migration and return the pending run.
  pub fn begin(
    &self,
    target: &str,
    operation: &str,
    mode: MigrationMode,
  ) -> Result<MigrationRun> {
    let run = MigrationRun {
      run_id: Uuid::new_v4(),
      target: target.to_owned(),
      operation: operation.to_owned(),
      mode,
      started_at: Utc::now(),
      completed_at: None,
      backup_reference: None,
      status: MigrationStatus::Pending,
      summary: serde_json::json!({}),
    };

    self.conn.execute(
      "INSERT INTO migration_runs
         (run_id, target, operation, mode, started_at, status, summary)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      rusqlite::params![
        run.run_id.hyphenated().to_string(),
        run.target,
        run.operation,
        run.mode.as_str(),
        run.started_at.to_rfc3339(),
        run.status.as_str(),
        run.summary.to_string(),
      ],
    )?;

    Ok(run)
  }

  /// Close out a pending run with its final status, backup reference, and
  /// summary. Mutates `run` to match what was persisted.
  pub fn finish(
    &self,
    run: &mut MigrationRun,
    status: MigrationStatus,
    backup_reference: Option<String>,
    summary: serde_json::Value,
  ) -> Result<()> {
    run.status = status;
    run.completed_at = Some(Utc::now());
    run.backup_reference = backup_reference;
    run.summary = summary;

    self.conn.execute(
      "UPDATE migration_runs
       SET status = ?2, completed_at = ?3, backup_reference = ?4, summary = ?5
       WHERE run_id = ?1",
      rusqlite::params![
        run.run_id.hyphenated().to_string(),
        run.status.as_str(),
        run.completed_at.map(|t| t.to_rfc3339()),
        run.backup_reference,
        run.summary.to_string(),
      ],
    )?;
    Ok(())
  }

  /// All recorded runs, most recent first.
  pub fn list(&self) -> Result<Vec<MigrationRun>> {
    let mut stmt = self.conn.prepare(
      "SELECT run_id, target, operation, mode, started_at, completed_at,
              backup_reference, status, summary
       FROM migration_runs
       ORDER BY started_at DESC",
    )?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, String>(3)?,
          row.get::<_, String>(4)?,
          row.get::<_, Option<String>>(5)?,
          row.get::<_, Option<String>>(6)?,
          row.get::<_, String>(7)?,
          row.get::<_, String>(8)?,
        ))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    rows
      .into_iter()
      .map(
        |(id, target, operation, mode, started, completed, backup, status, summary)| {
          Ok(MigrationRun {
            run_id: Uuid::parse_str(&id)?,
            target,
            operation,
            mode: decode_mode(&mode)?,
            started_at: decode_dt(&started)?,
            completed_at: completed.as_deref().map(decode_dt).transpose()?,
            backup_reference: backup,
            status: decode_status(&status)?,
            summary: serde_json::from_str(&summary)?,
          })
        },
      )
      .collect()
  }
}

fn decode_dt(s: &str) -> Result<chrono::DateTime<Utc>> {
  chrono::DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_mode(s: &str) -> Result<MigrationMode> {
  match s {
    "dry_run" => Ok(MigrationMode::DryRun),
    "live" => Ok(MigrationMode::Live),
    other => Err(Error::Decode(format!("unknown migration mode: {other:?}"))),
  }
}

fn decode_status(s: &str) -> Result<MigrationStatus> {
  match s {
    "pending" => Ok(MigrationStatus::Pending),
    "succeeded" => Ok(MigrationStatus::Succeeded),
    "failed" => Ok(MigrationStatus::Failed),
    "rolled_back" => Ok(MigrationStatus::RolledBack),
    other => Err(Error::Decode(format!("unknown migration status: {other:?}"))),
  }
}
