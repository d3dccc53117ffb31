use ekam_core::{
  identity::DocumentKind,
  migration::{CleanupSummary, MigrationMode, MigrationStatus},
};
use ekam_store_sqlite::IDENTITY_UNIQUE_INDEX;
use tempfile::TempDir;

use crate::{
  backup::{create_backup, restore_backup},
  cleanup::CleanupMigrator,
  runs::RunLog,
  schema::{SchemaMigrator, SchemaStep, StepState},
  Error,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// A per-kind store as the pre-migration pipeline created it: no `user_id`
/// column, no uniqueness constraint.
const LEGACY_STORE_DDL: &str = "
CREATE TABLE documents (
    document_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_number TEXT NOT NULL,
    fields_json     TEXT NOT NULL DEFAULT '{}',
    ingested_at     TEXT NOT NULL
);
";

struct Fixture {
  _dir:       TempDir,
  registry:   std::path::PathBuf,
  aadhaar:    std::path::PathBuf,
  pan:        std::path::PathBuf,
  backup_dir: std::path::PathBuf,
}

impl Fixture {
  fn new() -> Self {
    let dir = TempDir::new().unwrap();
    let registry = dir.path().join("registry.db");
    let aadhaar = dir.path().join("aadhaar.db");
    let pan = dir.path().join("pan.db");
    let backup_dir = dir.path().join("backups");

    for path in [&aadhaar, &pan] {
      let conn = rusqlite::Connection::open(path).unwrap();
      conn.execute_batch(LEGACY_STORE_DDL).unwrap();
    }

    Self { _dir: dir, registry, aadhaar, pan, backup_dir }
  }

  fn stores(&self) -> Vec<(DocumentKind, std::path::PathBuf)> {
    vec![
      (DocumentKind::Aadhaar, self.aadhaar.clone()),
      (DocumentKind::Pan, self.pan.clone()),
    ]
  }

  fn schema_migrator(&self) -> SchemaMigrator {
    SchemaMigrator::new(&self.registry, self.stores(), &self.backup_dir)
  }

  fn cleanup_migrator(&self) -> CleanupMigrator {
    CleanupMigrator::new(&self.registry, self.stores(), &self.backup_dir)
  }
}

fn insert_doc(
  path: &std::path::Path,
  number: &str,
  fields_json: &str,
  ingested_at: &str,
) -> i64 {
  let conn = rusqlite::Connection::open(path).unwrap();
  conn
    .execute(
      "INSERT INTO documents (identity_number, fields_json, ingested_at)
       VALUES (?1, ?2, ?3)",
      rusqlite::params![number, fields_json, ingested_at],
    )
    .unwrap();
  conn.last_insert_rowid()
}

fn doc_count(path: &std::path::Path) -> i64 {
  let conn = rusqlite::Connection::open(path).unwrap();
  conn
    .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
    .unwrap()
}

// ─── Schema migration ────────────────────────────────────────────────────────

#[test]
fn step_ids_round_trip() {
  for step in SchemaStep::all() {
    assert_eq!(SchemaStep::parse(&step.id()).unwrap(), step);
  }
  assert!(matches!(
    SchemaStep::parse("drop-everything"),
    Err(Error::UnknownStep(_))
  ));
}

#[test]
fn apply_all_migrates_clean_stores() {
  let fx = Fixture::new();
  insert_doc(&fx.aadhaar, "123456789012", r#"{"name":"A"}"#, "2024-01-01T00:00:00Z");

  let migrator = fx.schema_migrator();
  let runs = migrator.apply_all().unwrap();
  assert_eq!(runs.len(), SchemaStep::all().len());
  assert!(runs.iter().all(|r| r.status == MigrationStatus::Succeeded));

  for step in SchemaStep::all() {
    let verified = migrator.verify(step).unwrap();
    assert!(verified.ok(), "step {} missing {:?}", step.id(), verified.missing);
    assert_eq!(migrator.state(step).unwrap(), StepState::Applied);
  }
  assert_eq!(doc_count(&fx.aadhaar), 1);
}

#[test]
fn reapplying_a_step_is_a_recorded_noop() {
  let fx = Fixture::new();
  let migrator = fx.schema_migrator();
  migrator.apply(SchemaStep::CreateUsersTable).unwrap();
  let second = migrator.apply(SchemaStep::CreateUsersTable).unwrap();

  assert_eq!(second.status, MigrationStatus::Succeeded);
  assert_eq!(second.summary["skipped"], serde_json::json!(true));

  let log = RunLog::open(&fx.registry).unwrap();
  assert_eq!(log.list().unwrap().len(), 2);
}

#[test]
fn unique_index_rolls_back_when_duplicates_exist() {
  let fx = Fixture::new();
  let a = insert_doc(&fx.aadhaar, "123456789012", r#"{"name":"A"}"#, "2024-01-01T00:00:00Z");
  let b = insert_doc(&fx.aadhaar, "123456789012", r#"{"name":"B"}"#, "2024-01-02T00:00:00Z");
  insert_doc(&fx.aadhaar, "999988887777", r#"{"name":"C"}"#, "2024-01-03T00:00:00Z");

  let migrator = fx.schema_migrator();
  let err = migrator
    .apply(SchemaStep::AddIdentityUniqueIndex(DocumentKind::Aadhaar))
    .unwrap_err();

  match err {
    Error::ConstraintViolation { kind, violations } => {
      assert_eq!(kind, DocumentKind::Aadhaar);
      assert_eq!(violations.len(), 1);
      assert_eq!(violations[0].document_ids, vec![a, b]);
    }
    other => panic!("expected ConstraintViolation, got {other:?}"),
  }

  // Store restored untouched, index absent.
  assert_eq!(doc_count(&fx.aadhaar), 3);
  let conn = rusqlite::Connection::open(&fx.aadhaar).unwrap();
  let indexes: i64 = conn
    .query_row(
      "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
      [IDENTITY_UNIQUE_INDEX],
      |row| row.get(0),
    )
    .unwrap();
  assert_eq!(indexes, 0);

  let log = RunLog::open(&fx.registry).unwrap();
  let run = &log.list().unwrap()[0];
  assert_eq!(run.status, MigrationStatus::RolledBack);
  assert!(run.backup_reference.is_some());
}

// ─── Cleanup ─────────────────────────────────────────────────────────────────

#[test]
fn dry_run_plans_without_mutating() {
  let fx = Fixture::new();
  insert_doc(&fx.aadhaar, "123456789012", r#"{"name":"A"}"#, "2024-01-01T00:00:00Z");
  insert_doc(&fx.aadhaar, "123456789012", r#"{"name":"A","dob":"1990-01-01"}"#, "2024-01-02T00:00:00Z");

  let run = fx
    .cleanup_migrator()
    .run(DocumentKind::Aadhaar, MigrationMode::DryRun)
    .unwrap();

  assert_eq!(run.status, MigrationStatus::Succeeded);
  assert!(run.backup_reference.is_none());
  let summary: CleanupSummary = serde_json::from_value(run.summary).unwrap();
  assert_eq!(summary.groups_found, 1);
  assert_eq!(summary.rows_removed, 1);
  assert_eq!(doc_count(&fx.aadhaar), 2);
}

#[test]
fn live_cleanup_keeps_the_most_complete_row() {
  let fx = Fixture::new();
  // Completeness 2, 4, 3: the second row must survive.
  let ids = [
    insert_doc(&fx.aadhaar, "123456789012",
      r#"{"name":"A","dob":"1990-01-01"}"#, "2024-01-01T00:00:00Z"),
    insert_doc(&fx.aadhaar, "123456789012",
      r#"{"name":"A","dob":"1990-01-01","gender":"F","address":"X"}"#,
      "2024-01-02T00:00:00Z"),
    insert_doc(&fx.aadhaar, "123456789012",
      r#"{"name":"A","dob":"1990-01-01","gender":"F"}"#, "2024-01-03T00:00:00Z"),
  ];

  // The registry here predates every schema step, so the live run must
  // succeed with no cross reference table to repoint.
  let run = fx
    .cleanup_migrator()
    .run(DocumentKind::Aadhaar, MigrationMode::Live)
    .unwrap();

  assert_eq!(run.status, MigrationStatus::Succeeded);
  assert!(run.backup_reference.is_some());

  let summary: CleanupSummary = serde_json::from_value(run.summary).unwrap();
  assert_eq!(summary.groups_resolved, 1);
  assert_eq!(summary.rows_removed, 2);
  assert_eq!(summary.crossrefs_repointed, 0);
  assert_eq!(summary.groups[0].surviving_document_id, ids[1]);

  let conn = rusqlite::Connection::open(&fx.aadhaar).unwrap();
  let survivor: i64 = conn
    .query_row(
      "SELECT document_id FROM documents WHERE identity_number = '123456789012'",
      [],
      |row| row.get(0),
    )
    .unwrap();
  assert_eq!(survivor, ids[1]);
}

#[test]
fn live_cleanup_repoints_cross_references() {
  let fx = Fixture::new();
  let migrator = fx.schema_migrator();
  migrator.apply(SchemaStep::CreateUsersTable).unwrap();
  migrator.apply(SchemaStep::CreateCrossReferenceTable).unwrap();

  let loser = insert_doc(&fx.aadhaar, "123456789012", r#"{"name":"A"}"#, "2024-01-01T00:00:00Z");
  let winner = insert_doc(&fx.aadhaar, "123456789012",
    r#"{"name":"A","dob":"1990-01-01"}"#, "2024-01-02T00:00:00Z");

  let registry = rusqlite::Connection::open(&fx.registry).unwrap();
  registry
    .execute(
      "INSERT INTO users (user_id, primary_identity_number, primary_name,
                          created_at, updated_at, document_count)
       VALUES ('u-1', '123456789012', 'A',
               '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', 1)",
      [],
    )
    .unwrap();
  registry
    .execute(
      "INSERT INTO cross_references (user_id, document_kind, document_id, linked_at)
       VALUES ('u-1', 'aadhaar', ?1, '2024-01-01T00:00:00Z')",
      [loser],
    )
    .unwrap();
  drop(registry);

  let run = fx
    .cleanup_migrator()
    .run(DocumentKind::Aadhaar, MigrationMode::Live)
    .unwrap();

  let summary: CleanupSummary = serde_json::from_value(run.summary).unwrap();
  assert_eq!(summary.crossrefs_repointed, 1);

  let registry = rusqlite::Connection::open(&fx.registry).unwrap();
  let pointed: i64 = registry
    .query_row(
      "SELECT document_id FROM cross_references WHERE user_id = 'u-1'",
      [],
      |row| row.get(0),
    )
    .unwrap();
  assert_eq!(pointed, winner);
}

#[test]
fn cleanup_is_idempotent() {
  let fx = Fixture::new();
  insert_doc(&fx.aadhaar, "123456789012", r#"{"name":"A"}"#, "2024-01-01T00:00:00Z");
  insert_doc(&fx.aadhaar, "123456789012", r#"{"name":"B"}"#, "2024-01-02T00:00:00Z");

  let migrator = fx.cleanup_migrator();
  migrator.run(DocumentKind::Aadhaar, MigrationMode::Live).unwrap();
  let second = migrator.run(DocumentKind::Aadhaar, MigrationMode::Live).unwrap();

  let summary: CleanupSummary = serde_json::from_value(second.summary).unwrap();
  assert_eq!(summary.groups_found, 0);
  assert_eq!(summary.rows_removed, 0);
  assert_eq!(doc_count(&fx.aadhaar), 1);
}

#[test]
fn cleanup_then_unique_index_succeeds() {
  let fx = Fixture::new();
  insert_doc(&fx.aadhaar, "123456789012", r#"{"name":"A"}"#, "2024-01-01T00:00:00Z");
  insert_doc(&fx.aadhaar, "123456789012", r#"{"name":"B"}"#, "2024-01-02T00:00:00Z");

  fx.cleanup_migrator()
    .run(DocumentKind::Aadhaar, MigrationMode::Live)
    .unwrap();
  let run = fx
    .schema_migrator()
    .apply(SchemaStep::AddIdentityUniqueIndex(DocumentKind::Aadhaar))
    .unwrap();
  assert_eq!(run.status, MigrationStatus::Succeeded);
}

#[test]
fn failed_cleanup_records_a_failed_run() {
  let fx = Fixture::new();
  // A store file that was never initialized: no documents table.
  let bare = fx.registry.with_file_name("bare.db");
  let conn = rusqlite::Connection::open(&bare).unwrap();
  conn.execute_batch("PRAGMA user_version = 1").unwrap();
  drop(conn);

  let migrator = CleanupMigrator::new(
    &fx.registry,
    vec![(DocumentKind::Aadhaar, bare)],
    &fx.backup_dir,
  );
  migrator.run(DocumentKind::Aadhaar, MigrationMode::Live).unwrap_err();

  let log = RunLog::open(&fx.registry).unwrap();
  let run = &log.list().unwrap()[0];
  assert_eq!(run.status, MigrationStatus::Failed);
  assert!(run.completed_at.is_some());
  assert!(run.summary["error"].is_string());
}

#[test]
fn failed_schema_step_records_a_failed_run() {
  let fx = Fixture::new();
  let bare = fx.registry.with_file_name("bare.db");
  let conn = rusqlite::Connection::open(&bare).unwrap();
  conn.execute_batch("PRAGMA user_version = 1").unwrap();
  drop(conn);

  let migrator = SchemaMigrator::new(
    &fx.registry,
    vec![(DocumentKind::Aadhaar, bare)],
    &fx.backup_dir,
  );
  migrator
    .apply(SchemaStep::AddUserIdColumn(DocumentKind::Aadhaar))
    .unwrap_err();

  let log = RunLog::open(&fx.registry).unwrap();
  let run = &log.list().unwrap()[0];
  assert_eq!(run.status, MigrationStatus::Failed);
  // The backup taken before the step failed stays on record.
  assert!(run.backup_reference.is_some());
}

// ─── Run log & backups ───────────────────────────────────────────────────────

#[test]
fn run_log_records_and_lists_runs() {
  let fx = Fixture::new();
  let log = RunLog::open(&fx.registry).unwrap();

  let mut first = log.begin("aadhaar", "cleanup", MigrationMode::DryRun).unwrap();
  log
    .finish(
      &mut first,
      MigrationStatus::Succeeded,
      None,
      serde_json::json!({ "groups_found": 0 }),
    )
    .unwrap();
  let pending = log.begin("pan", "cleanup", MigrationMode::Live).unwrap();

  let listed = log.list().unwrap();
  assert_eq!(listed.len(), 2);
  let by_id = |id: uuid::Uuid| listed.iter().find(|r| r.run_id == id).unwrap();
  assert_eq!(by_id(first.run_id).status, MigrationStatus::Succeeded);
  assert!(by_id(first.run_id).completed_at.is_some());
  assert_eq!(by_id(pending.run_id).status, MigrationStatus::Pending);
}

#[test]
fn backup_round_trips_store_contents() {
  let fx = Fixture::new();
  insert_doc(&fx.aadhaar, "123456789012", r#"{"name":"A"}"#, "2024-01-01T00:00:00Z");

  let backup = create_backup(&fx.aadhaar, &fx.backup_dir).unwrap();
  insert_doc(&fx.aadhaar, "999988887777", r#"{"name":"B"}"#, "2024-01-02T00:00:00Z");
  assert_eq!(doc_count(&fx.aadhaar), 2);

  restore_backup(&backup, &fx.aadhaar).unwrap();
  assert_eq!(doc_count(&fx.aadhaar), 1);
}

#[test]
fn restore_of_missing_backup_fails() {
  let fx = Fixture::new();
  let err = restore_backup(&fx.backup_dir.join("nope.db"), &fx.aadhaar).unwrap_err();
  assert!(matches!(err, Error::MissingBackup(_)));
}
