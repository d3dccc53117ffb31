//! Duplicate cleanup for legacy document stores.
//!
//! Resolves each duplicate group down to a single surviving row. Cross
//! references in the registry are repointed to the survivor before the
//! losing rows are deleted, and each group is committed on its own, so an
//! interrupted live run leaves no dangling references and simply resumes
//! from the first unprocessed group when re-executed.

use std::path::{Path, PathBuf};

use ekam_core::{
  identity::DocumentKind,
  migration::{
    CleanupSummary, GroupResolution, MigrationMode, MigrationRun,
    MigrationStatus,
  },
};
use tracing::{debug, info};

use crate::{
  backup::create_backup,
  runs::RunLog,
  scan::{self, select_survivor},
  Error, Result,
};

pub struct CleanupMigrator {
  registry_path: PathBuf,
  stores:        Vec<(DocumentKind, PathBuf)>,
  backup_dir:    PathBuf,
}

impl CleanupMigrator {
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

  /// Resolve duplicates in one store. Dry-run mode records the full plan in
  /// the run summary without touching either database.
  pub fn run(
    &self,
    kind: DocumentKind,
    mode: MigrationMode,
  ) -> Result<MigrationRun> {
    let log = RunLog::open(&self.registry_path)?;
    let mut run = log.begin(kind.as_str(), "cleanup", mode)?;

    match self.run_inner(kind, mode, &log, &mut run) {
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

  fn run_inner(
    &self,
    kind: DocumentKind,
    mode: MigrationMode,
    log: &RunLog,
    run: &mut MigrationRun,
  ) -> Result<()> {
    let store_path = self.store_path(kind)?;
    let mut docs = rusqlite::Connection::open(store_path)?;
    let groups = scan::duplicate_groups(&docs)?;

    let plan: Vec<GroupResolution> = groups
      .iter()
      .map(|(_, rows)| {
        let survivor = select_survivor(rows);
        GroupResolution {
          surviving_document_id: survivor.document_id,
          removed_document_ids:  rows
            .iter()
            .map(|r| r.document_id)
            .filter(|id| *id != survivor.document_id)
            .collect(),
        }
      })
      .collect();

    let mut summary = CleanupSummary {
      groups_found: groups.len(),
      groups: plan.clone(),
      ..CleanupSummary::default()
    };

    if mode == MigrationMode::DryRun {
      summary.groups_resolved = plan.len();
      summary.rows_removed = plan.iter().map(|g| g.removed_document_ids.len()).sum();
      info!(
        store = %kind,
        groups = summary.groups_found,
        rows = summary.rows_removed,
        "cleanup dry run complete, no rows touched"
      );
      log.finish(
        run,
        MigrationStatus::Succeeded,
        None,
        serde_json::to_value(&summary)?,
      )?;
      return Ok(());
    }

    if groups.is_empty() {
      info!(store = %kind, "cleanup found no duplicate groups");
      log.finish(
        run,
        MigrationStatus::Succeeded,
        None,
        serde_json::to_value(&summary)?,
      )?;
      return Ok(());
    }

    let store_backup = create_backup(store_path, &self.backup_dir)?;
    let registry_backup = create_backup(&self.registry_path, &self.backup_dir)?;
    run.backup_reference = Some(store_backup.display().to_string());

    let mut registry = rusqlite::Connection::open(&self.registry_path)?;

    // Cleanup runs against legacy registries before any schema step, so the
    // cross reference table may not exist yet. Nothing to repoint in that
    // case.
    let has_crossrefs =
      crate::schema::table_exists(&registry, "cross_references")?;

    // Repoint before delete, one group per commit pair. A crash between the
    // two commits leaves the loser rows in place for the next run, never a
    // cross reference to a deleted row.
    for group in &plan {
      if has_crossrefs {
        let tx = registry.transaction()?;
        for loser in &group.removed_document_ids {
          summary.crossrefs_repointed += tx.execute(
            "UPDATE cross_references SET document_id = ?1
             WHERE document_kind = ?2 AND document_id = ?3",
            rusqlite::params![group.surviving_document_id, kind.as_str(), loser],
          )?;
        }
        tx.commit()?;
      }

      let tx = docs.transaction()?;
      for loser in &group.removed_document_ids {
        summary.rows_removed +=
          tx.execute("DELETE FROM documents WHERE document_id = ?1", [loser])?;
      }
      tx.commit()?;

      summary.groups_resolved += 1;
      debug!(
        store = %kind,
        survivor = group.surviving_document_id,
        removed = group.removed_document_ids.len(),
        "duplicate group resolved"
      );
    }

    let remaining = scan::duplicate_groups(&docs)?.len();
    if remaining > 0 {
      let backup = run.backup_reference.clone();
      log.finish(
        run,
        MigrationStatus::Failed,
        backup,
        serde_json::to_value(&summary)?,
      )?;
      return Err(Error::PartialFailure { kind, remaining });
    }

    info!(
      store = %kind,
      groups = summary.groups_resolved,
      rows = summary.rows_removed,
      crossrefs = summary.crossrefs_repointed,
      registry_backup = %registry_backup.display(),
      "cleanup complete"
    );
    let backup = run.backup_reference.clone();
    log.finish(
      run,
      MigrationStatus::Succeeded,
      backup,
      serde_json::to_value(&summary)?,
    )?;
    Ok(())
  }
}
