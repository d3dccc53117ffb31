//! JSON REST API for Ekam.
//!
//! Exposes an axum [`Router`] backed by any
//! [`RegistryStore`](ekam_core::store::RegistryStore) /
//! [`DocumentStore`](ekam_core::store::DocumentStore) pair. Auth, TLS, and
//! transport concerns are the caller's responsibility.
//!
//! Maintenance endpoints under `/admin` run the migrators against the
//! configured on-disk stores; deploy them behind an operator-only surface.

pub mod admin;
pub mod error;
pub mod ingest;
pub mod reports;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use ekam_core::{
  identity::DocumentKind,
  pipeline::Ingestor,
  store::{DocumentStore, RegistryStore},
};
use serde::Deserialize;

pub use error::ApiError;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` or the
/// `EKAM_*` environment.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:          String,
  pub port:          u16,
  pub registry_path: PathBuf,
  pub aadhaar_path:  PathBuf,
  pub pan_path:      PathBuf,
  pub backup_dir:    PathBuf,
}

/// On-disk locations the admin endpoints hand to the migrators. The online
/// stores keep their own connections; migrations require the operator to
/// have quiesced ingestion first.
#[derive(Clone)]
pub struct StorePaths {
  pub registry:   PathBuf,
  pub aadhaar:    PathBuf,
  pub pan:        PathBuf,
  pub backup_dir: PathBuf,
}

impl StorePaths {
  pub fn stores(&self) -> Vec<(DocumentKind, PathBuf)> {
    vec![
      (DocumentKind::Aadhaar, self.aadhaar.clone()),
      (DocumentKind::Pan, self.pan.clone()),
    ]
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<R, D> {
  pub ingestor: Arc<Ingestor<R, D>>,
  pub paths:    Arc<StorePaths>,
}

impl<R, D> Clone for AppState<R, D> {
  fn clone(&self) -> Self {
    Self {
      ingestor: self.ingestor.clone(),
      paths:    self.paths.clone(),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for the given state.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<R, D>(state: AppState<R, D>) -> Router<()>
where
  R: RegistryStore + Send + Sync + 'static,
  R::Error: std::error::Error + Send + Sync + 'static,
  D: DocumentStore + Send + Sync + 'static,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  Router::new()
    // Ingestion
    .route("/ingest", post(ingest::handler::<R, D>))
    .route("/ingest/check", post(ingest::check::<R, D>))
    // Lookups & reporting
    .route("/users/{id}", get(reports::get_user::<R, D>))
    .route("/reports/duplicates", get(reports::duplicates::<R, D>))
    .route("/stats/users", get(reports::user_stats::<R, D>))
    // Maintenance
    .route("/admin/cleanup", post(admin::run_cleanup::<R, D>))
    .route("/admin/schema/apply", post(admin::apply_schema::<R, D>))
    .route("/admin/schema", get(admin::verify_schema::<R, D>))
    .route("/admin/runs", get(admin::list_runs::<R, D>))
    .with_state(state)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
