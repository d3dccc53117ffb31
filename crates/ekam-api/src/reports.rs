//! Read-only lookup and reporting handlers.

use axum::{
  Json,
  extract::{Path, State},
};
use ekam_core::{
  outcome::DuplicateReport,
  store::{DocumentStore, RegistryStore},
  user::{User, UserStatistics},
};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// `GET /users/:id`
pub async fn get_user<R, D>(
  State(state): State<AppState<R, D>>,
  Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError>
where
  R: RegistryStore,
  R::Error: std::error::Error + Send + Sync + 'static,
  D: DocumentStore,
{
  let user = state
    .ingestor
    .registry()
    .lookup_by_user_id(id)
    .await
    .map_err(|e| ApiError::Unavailable(e.to_string()))?
    .ok_or_else(|| ApiError::NotFound(format!("user {id} not found")))?;
  Ok(Json(user))
}

/// `GET /reports/duplicates` — per-store duplicate metrics. On stores
/// carrying the unique index every group count is zero; nonzero numbers
/// mean a legacy store awaiting cleanup.
pub async fn duplicates<R, D>(
  State(state): State<AppState<R, D>>,
) -> Result<Json<DuplicateReport>, ApiError>
where
  R: RegistryStore,
  R::Error: std::error::Error + Send + Sync + 'static,
  D: DocumentStore,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  Ok(Json(state.ingestor.duplicate_report().await?))
}

/// `GET /stats/users`
pub async fn user_stats<R, D>(
  State(state): State<AppState<R, D>>,
) -> Result<Json<UserStatistics>, ApiError>
where
  R: RegistryStore,
  R::Error: std::error::Error + Send + Sync + 'static,
  D: DocumentStore,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  Ok(Json(state.ingestor.user_statistics().await?))
}
