//! File-copy backups of SQLite stores, taken before constraint-adding or
//! destructive migration steps.

use std::{
  fs,
  path::{Path, PathBuf},
};

use chrono::Utc;
use tracing::info;

use crate::{Error, Result};

/// Copy `db_path` into `backup_dir` under a timestamped name and return the
/// backup path. The WAL is checkpointed first so the copy is self-contained.
///
/// Callers hold exclusive access to the store, so a plain file copy is a
/// consistent snapshot.
pub fn create_backup(db_path: &Path, backup_dir: &Path) -> Result<PathBuf> {
  fs::create_dir_all(backup_dir)?;

  // Fold any WAL contents back into the main file before copying.
  let conn = rusqlite::Connection::open(db_path)?;
  conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
  drop(conn);

  let stem = db_path
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or("store");
  let stamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
  let backup_path = backup_dir.join(format!("{stem}_pre_migration_{stamp}.db"));

  fs::copy(db_path, &backup_path)?;
  info!(backup = %backup_path.display(), "created migration backup");
  Ok(backup_path)
}

/// Overwrite `target` with the contents of `backup`.
pub fn restore_backup(backup: &Path, target: &Path) -> Result<()> {
  if !backup.exists() {
    return Err(Error::MissingBackup(backup.to_owned()));
  }
  // Stale WAL/SHM sidecars would shadow the restored main file.
  for suffix in ["-wal", "-shm"] {
    let mut sidecar = target.as_os_str().to_owned();
    sidecar.push(suffix);
    let sidecar = PathBuf::from(sidecar);
    if sidecar.exists() {
      fs::remove_file(&sidecar)?;
    }
  }
  fs::copy(backup, target)?;
  info!(backup = %backup.display(), target = %target.display(), "restored from backup");
  Ok(())
}
