//! Stepwise schema evolution for legacy stores.
//!
//! Each [`SchemaStep`] is idempotent and independently verifiable, so a
//! partially-migrated deployment can be inspected and resumed step by step.
//! Steps that rewrite a document store take a file backup first and restore
//! it if the step cannot complete.

use std::path::{Path, PathBuf};

use ekam_core::{
  identity::DocumentKind,
  migration::{MigrationMode, MigrationRun, MigrationStatus, VerificationResult},
};
use ekam_store_sqlite::IDENTITY_UNIQUE_INDEX;
use tracing::{info, warn};

use crate::{
  backup::{create_backup, restore_backup},
  error::GroupViolation,
  runs::RunLog,
  scan, Error, Result,
};

// ─── Steps ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStep {
  CreateUsersTable,
  CreateCrossReferenceTable,
  CreateMigrationRunsTable,
  AddUserIdColumn(DocumentKind),
  AddIdentityUniqueIndex(DocumentKind),
}

impl SchemaStep {
  /// Every step in application order. Registry tables come first so
  /// document rows always have a registry to reference.
  pub fn all() -> Vec<SchemaStep> {
    let mut steps = vec![
      SchemaStep::CreateUsersTable,
      SchemaStep::CreateCrossReferenceTable,
      SchemaStep::CreateMigrationRunsTable,
    ];
    for kind in DocumentKind::ALL {
      steps.push(SchemaStep::AddUserIdColumn(kind));
    }
    for kind in DocumentKind::ALL {
      steps.push(SchemaStep::AddIdentityUniqueIndex(kind));
    }
    steps
  }

  /// Stable identifier, recorded as the run's `operation` and accepted by
  /// [`SchemaStep::parse`].
  pub fn id(self) -> String {
    match self {
      SchemaStep::CreateUsersTable => "create-users-table".into(),
      SchemaStep::CreateCrossReferenceTable => {
        "create-cross-reference-table".into()
      }
      SchemaStep::CreateMigrationRunsTable => {
        "create-migration-runs-table".into()
      }
      SchemaStep::AddUserIdColumn(kind) => {
        format!("add-user-id-column:{kind}")
      }
      SchemaStep::AddIdentityUniqueIndex(kind) => {
        format!("add-identity-unique-index:{kind}")
      }
    }
  }

  pub fn parse(s: &str) -> Result<SchemaStep> {
    let step = match s {
      "create-users-table" => SchemaStep::CreateUsersTable,
      "create-cross-reference-table" => SchemaStep::CreateCrossReferenceTable,
      "create-migration-runs-table" => SchemaStep::CreateMigrationRunsTable,
      other => {
        let (op, kind) = other
          .split_once(':')
          .ok_or_else(|| Error::UnknownStep(other.to_owned()))?;
        let kind = kind
          .parse::<DocumentKind>()
          .map_err(|_| Error::UnknownStep(other.to_owned()))?;
        match op {
          "add-user-id-column" => SchemaStep::AddUserIdColumn(kind),
          "add-identity-unique-index" => SchemaStep::AddIdentityUniqueIndex(kind),
          _ => return Err(Error::UnknownStep(other.to_owned())),
        }
      }
    };
    Ok(step)
  }

  /// Which database the step operates on.
  pub fn target(self) -> String {
    match self {
      SchemaStep::CreateUsersTable
      | SchemaStep::CreateCrossReferenceTable
      | SchemaStep::CreateMigrationRunsTable => "registry".into(),
      SchemaStep::AddUserIdColumn(kind)
      | SchemaStep::AddIdentityUniqueIndex(kind) => kind.to_string(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
  NotApplied,
  Applied,
}

// ─── Migrator ────────────────────────────────────────────────────────────────

pub struct SchemaMigrator {
  registry_path: PathBuf,
  stores:        Vec<(DocumentKind, PathBuf)>,
  backup_dir:    PathBuf,
}

impl SchemaMigrator {
  pub fn new(
    registry_path: impl Into<PathBuf>,
    stores: Vec<(DocumentKind, PathBuf)>,
    backup_dir: impl Into<PathBuf>,
  ) -> Self {
    Self {
      registry_path: registry_path.into(),
      stores,
      backup_dir: backup_dir.into(),
    }
  }

  fn store_path(&self, kind: DocumentKind) -> Result<&Path> {
    self
      .stores
      .iter()
      .find(|(k, _)| *k == kind)
      .map(|(_, p)| p.as_path())
      .ok_or(Error::UnknownStore(kind))
  }

  fn db_path(&self, step: SchemaStep) -> Result<&Path> {
    match step {
      SchemaStep::CreateUsersTable
      | SchemaStep::CreateCrossReferenceTable
      | SchemaStep::CreateMigrationRunsTable => Ok(&self.registry_path),
      SchemaStep::AddUserIdColumn(kind)
      | SchemaStep::AddIdentityUniqueIndex(kind) => self.store_path(kind),
    }
  }

  /// Whether the step's schema object already exists on its target.
  pub fn state(&self, step: SchemaStep) -> Result<StepState> {
    let verified = self.verify(step)?;
    Ok(if verified.ok() {
      StepState::Applied
    } else {
      StepState::NotApplied
    })
  }

  /// Re-read the live schema and list which of the step's expectations are
  /// not satisfied.
  pub fn verify(&self, step: SchemaStep) -> Result<VerificationResult> {
    let conn = rusqlite::Connection::open(self.db_path(step)?)?;
    let mut missing = Vec::new();

    match step {
      SchemaStep::CreateUsersTable => {
        if !table_exists(&conn, "users")? {
          missing.push("table:users".to_owned());
        }
      }
      SchemaStep::CreateCrossReferenceTable => {
        if !table_exists(&conn, "cross_references")? {
          missing.push("table:cross_references".to_owned());
        }
      }
      SchemaStep::CreateMigrationRunsTable => {
        if !table_exists(&conn, "migration_runs")? {
          missing.push("table:migration_runs".to_owned());
        }
      }
      SchemaStep::AddUserIdColumn(_) => {
        if !column_exists(&conn, "documents", "user_id")? {
          missing.push("column:documents.user_id".to_owned());
        }
      }
      SchemaStep::AddIdentityUniqueIndex(_) => {
        if !index_exists(&conn, IDENTITY_UNIQUE_INDEX)? {
          missing.push(format!("index:{IDENTITY_UNIQUE_INDEX}"));
        }
      }
    }

    Ok(VerificationResult { step: step.id(), missing })
  }

  /// Apply one step, recording a run in the registry's audit table. Already
  /// applied steps finish immediately with a `skipped` summary.
  pub fn apply(&self, step: SchemaStep) -> Result<MigrationRun> {
    let log = RunLog::open(&self.registry_path)?;
    let mut run = log.begin(&step.target(), &step.id(), MigrationMode::Live)?;

    if self.state(step)? == StepState::Applied {
      info!(step = %step.id(), "schema step already applied, skipping");
      log.finish(
        &mut run,
        MigrationStatus::Succeeded,
        None,
        serde_json::json!({ "skipped": true }),
      )?;
      return Ok(run);
    }

    let result = self.apply_inner(step, &log, &mut run);
    match result {
      Ok(()) => Ok(run),
      Err(e) => {
        if run.status == MigrationStatus::Pending {
          let backup = run.backup_reference.clone();
          log.finish(
            &mut run,
            MigrationStatus::Failed,
            backup,
            serde_json::json!({ "error": e.to_string() }),
          )?;
        }
        Err(e)
      }
    }
  }

  fn apply_inner(
    &self,
    step: SchemaStep,
    log: &RunLog,
    run: &mut MigrationRun,
  ) -> Result<()> {
    match step {
      SchemaStep::CreateUsersTable
      | SchemaStep::CreateCrossReferenceTable
      | SchemaStep::CreateMigrationRunsTable => {
        let conn = rusqlite::Connection::open(&self.registry_path)?;
        conn.execute_batch(registry_ddl(step))?;
        info!(step = %step.id(), "schema step applied");
        log.finish(run, MigrationStatus::Succeeded, None, serde_json::json!({}))?;
        Ok(())
      }

      SchemaStep::AddUserIdColumn(kind) => {
        let path = self.store_path(kind)?;
        let backup = create_backup(path, &self.backup_dir)?;
        run.backup_reference = Some(backup.display().to_string());

        let conn = rusqlite::Connection::open(path)?;
        let before = row_count(&conn, "documents")?;
        conn.execute("ALTER TABLE documents ADD COLUMN user_id TEXT", [])?;
        let after = row_count(&conn, "documents")?;
        if before != after {
          return Err(Error::RowCountChanged {
            table: "documents".to_owned(),
            before,
            after,
          });
        }

        info!(step = %step.id(), rows = after, "schema step applied");
        let backup = run.backup_reference.clone();
        log.finish(
          run,
          MigrationStatus::Succeeded,
          backup,
          serde_json::json!({ "rows": after }),
        )?;
        Ok(())
      }

      SchemaStep::AddIdentityUniqueIndex(kind) => {
        self.apply_unique_index(kind, log, run)
      }
    }
  }

  /// The one step that can fail on data rather than schema: pre-existing
  /// duplicates block the unique index. The store is restored from backup
  /// and the blocking groups are reported so cleanup can run first.
  fn apply_unique_index(
    &self,
    kind: DocumentKind,
    log: &RunLog,
    run: &mut MigrationRun,
  ) -> Result<()> {
    let path = self.store_path(kind)?;
    let backup = create_backup(path, &self.backup_dir)?;
    run.backup_reference = Some(backup.display().to_string());

    let conn = rusqlite::Connection::open(path)?;
    let before = row_count(&conn, "documents")?;

    let created = conn.execute_batch(&format!(
      "CREATE UNIQUE INDEX {IDENTITY_UNIQUE_INDEX}
       ON documents(identity_number)"
    ));

    match created {
      Ok(()) => {
        let after = row_count(&conn, "documents")?;
        if before != after {
          return Err(Error::RowCountChanged {
            table: "documents".to_owned(),
            before,
            after,
          });
        }
        info!(store = %kind, rows = after, "unique index created");
        let reference = run.backup_reference.clone();
        log.finish(
          run,
          MigrationStatus::Succeeded,
          reference,
          serde_json::json!({ "rows": after }),
        )?;
        Ok(())
      }
      Err(e) if is_constraint_violation(&e) => {
        let violations: Vec<GroupViolation> = scan::duplicate_groups(&conn)?
          .into_iter()
          .map(|(_, rows)| GroupViolation {
            document_ids: rows.iter().map(|r| r.document_id).collect(),
          })
          .collect();
        drop(conn);
        restore_backup(&backup, path)?;

        warn!(
          store = %kind,
          groups = violations.len(),
          "unique index blocked by duplicates, store restored"
        );
        let reference = run.backup_reference.clone();
        log.finish(
          run,
          MigrationStatus::RolledBack,
          reference,
          serde_json::json!({ "duplicate_groups": violations }),
        )?;
        Err(Error::ConstraintViolation { kind, violations })
      }
      Err(e) => Err(e.into()),
    }
  }

  /// Apply every pending step in order, stopping at the first failure.
  pub fn apply_all(&self) -> Result<Vec<MigrationRun>> {
    let mut runs = Vec::new();
    for step in SchemaStep::all() {
      runs.push(self.apply(step)?);
    }
    Ok(runs)
  }
}

// ─── SQL helpers ─────────────────────────────────────────────────────────────

fn registry_ddl(step: SchemaStep) -> &'static str {
  match step {
    SchemaStep::CreateUsersTable => {
      "CREATE TABLE IF NOT EXISTS users (
         user_id                 TEXT PRIMARY KEY,
         primary_identity_number TEXT UNIQUE,
         primary_name            TEXT NOT NULL,
         created_at              TEXT NOT NULL,
         updated_at              TEXT NOT NULL,
         document_count          INTEGER NOT NULL DEFAULT 0
       );
       CREATE UNIQUE INDEX IF NOT EXISTS idx_users_primary_identity_number_unique
         ON users(primary_identity_number);"
    }
    SchemaStep::CreateCrossReferenceTable => {
      "CREATE TABLE IF NOT EXISTS cross_references (
         user_id       TEXT NOT NULL REFERENCES users(user_id),
         document_kind TEXT NOT NULL,
         document_id   INTEGER NOT NULL,
         linked_at     TEXT NOT NULL,
         PRIMARY KEY (user_id, document_kind)
       );"
    }
    SchemaStep::CreateMigrationRunsTable => {
      "CREATE TABLE IF NOT EXISTS migration_runs (
         run_id           TEXT PRIMARY KEY,
         target           TEXT NOT NULL,
         operation        TEXT NOT NULL,
         mode             TEXT NOT NULL,
         started_at       TEXT NOT NULL,
         completed_at     TEXT,
         backup_reference TEXT,
         status           TEXT NOT NULL,
         summary          TEXT NOT NULL DEFAULT '{}'
       );"
    }
    _ => unreachable!("not a registry DDL step"),
  }
}

pub(crate) fn table_exists(
  conn: &rusqlite::Connection,
  name: &str,
) -> Result<bool> {
  let count: i64 = conn.query_row(
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
    [name],
    |row| row.get(0),
  )?;
  Ok(count > 0)
}

fn index_exists(conn: &rusqlite::Connection, name: &str) -> Result<bool> {
  let count: i64 = conn.query_row(
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
    [name],
    |row| row.get(0),
  )?;
  Ok(count > 0)
}

fn column_exists(
  conn: &rusqlite::Connection,
  table: &str,
  column: &str,
) -> Result<bool> {
  let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
  let names = stmt
    .query_map([], |row| row.get::<_, String>(1))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(names.iter().any(|n| n == column))
}

fn row_count(conn: &rusqlite::Connection, table: &str) -> Result<i64> {
  Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
    row.get(0)
  })?)
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(err, _)
      if err.code == rusqlite::ErrorCode::ConstraintViolation
  )
}
