//! Maintenance handlers wrapping the `ekam-migrate` tooling.
//!
//! The migrators are synchronous and want exclusive access to the files
//! they touch, so each handler hops onto the blocking pool. Ingestion
//! against a store must be quiesced before running a live migration on it.

use axum::{
  Json,
  extract::State,
};
use ekam_core::{
  identity::DocumentKind,
  migration::{MigrationMode, MigrationRun, VerificationResult},
  store::{DocumentStore, RegistryStore},
};
use ekam_migrate::{CleanupMigrator, RunLog, SchemaMigrator, SchemaStep};
use serde::Deserialize;

use crate::{AppState, StorePaths, error::ApiError};

async fn on_blocking_pool<T, F>(f: F) -> Result<T, ApiError>
where
  T: Send + 'static,
  F: FnOnce() -> Result<T, ekam_migrate::Error> + Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| ApiError::Internal(Box::new(e)))?
    .map_err(ApiError::from)
}

// ─── Cleanup ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CleanupBody {
  pub store: DocumentKind,
  /// Defaults to a dry run; live cleanup must be asked for explicitly.
  #[serde(default)]
  pub mode:  Option<MigrationMode>,
}

/// `POST /admin/cleanup` — body: `{"store":"aadhaar","mode":"live"}`.
pub async fn run_cleanup<R, D>(
  State(state): State<AppState<R, D>>,
  Json(body): Json<CleanupBody>,
) -> Result<Json<MigrationRun>, ApiError>
where
  R: RegistryStore,
  D: DocumentStore,
{
  let paths = state.paths.as_ref().clone();
  let mode = body.mode.unwrap_or(MigrationMode::DryRun);
  let run = on_blocking_pool(move || {
    cleanup_migrator(&paths).run(body.store, mode)
  })
  .await?;
  Ok(Json(run))
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SchemaBody {
  /// A step id such as `"add-identity-unique-index:aadhaar"`, or absent to
  /// apply every pending step in order.
  pub step: Option<String>,
}

/// `POST /admin/schema/apply`
pub async fn apply_schema<R, D>(
  State(state): State<AppState<R, D>>,
  Json(body): Json<SchemaBody>,
) -> Result<Json<Vec<MigrationRun>>, ApiError>
where
  R: RegistryStore,
  D: DocumentStore,
{
  let paths = state.paths.as_ref().clone();
  let runs = on_blocking_pool(move || {
    let migrator = schema_migrator(&paths);
    match body.step {
      Some(id) => Ok(vec![migrator.apply(SchemaStep::parse(&id)?)?]),
      None => migrator.apply_all(),
    }
  })
  .await?;
  Ok(Json(runs))
}

/// `GET /admin/schema` — verification results for every known step.
pub async fn verify_schema<R, D>(
  State(state): State<AppState<R, D>>,
) -> Result<Json<Vec<VerificationResult>>, ApiError>
where
  R: RegistryStore,
  D: DocumentStore,
{
  let paths = state.paths.as_ref().clone();
  let results = on_blocking_pool(move || {
    let migrator = schema_migrator(&paths);
    SchemaStep::all()
      .into_iter()
      .map(|step| migrator.verify(step))
      .collect()
  })
  .await?;
  Ok(Json(results))
}

// ─── Run log ─────────────────────────────────────────────────────────────────

/// `GET /admin/runs` — the full migration audit trail, most recent first.
pub async fn list_runs<R, D>(
  State(state): State<AppState<R, D>>,
) -> Result<Json<Vec<MigrationRun>>, ApiError>
where
  R: RegistryStore,
  D: DocumentStore,
{
  let paths = state.paths.as_ref().clone();
  let runs =
    on_blocking_pool(move || RunLog::open(&paths.registry)?.list()).await?;
  Ok(Json(runs))
}

fn schema_migrator(paths: &StorePaths) -> SchemaMigrator {
  SchemaMigrator::new(&paths.registry, paths.stores(), &paths.backup_dir)
}

fn cleanup_migrator(paths: &StorePaths) -> CleanupMigrator {
  CleanupMigrator::new(&paths.registry, paths.stores(), &paths.backup_dir)
}
