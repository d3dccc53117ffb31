//! Handlers for the ingestion endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/ingest` | Body: [`ExtractionResult`]; status reflects the outcome |
//! | `POST` | `/ingest/check` | Body: [`CheckBody`]; duplicate pre-check, no write |

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use ekam_core::{
  document::ExtractionResult,
  identity::{DocumentKind, IdentityNumber},
  outcome::{IngestOutcome, Uniqueness},
  store::{DocumentStore, RegistryStore},
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

/// `POST /ingest` — run one extraction result through the pipeline.
///
/// The response body is always the [`IngestOutcome`]; the status code
/// mirrors it: 201 for `created`/`linked`, 409 for `duplicate`, 422 for
/// `rejected`.
pub async fn handler<R, D>(
  State(state): State<AppState<R, D>>,
  Json(input): Json<ExtractionResult>,
) -> Result<impl IntoResponse, ApiError>
where
  R: RegistryStore,
  R::Error: std::error::Error + Send + Sync + 'static,
  D: DocumentStore,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  let outcome = state.ingestor.ingest(input).await?;
  let status = match &outcome {
    IngestOutcome::Created { .. } | IngestOutcome::Linked { .. } => {
      StatusCode::CREATED
    }
    IngestOutcome::Duplicate { .. } => StatusCode::CONFLICT,
    IngestOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
  };
  Ok((status, Json(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct CheckBody {
  pub kind:                DocumentKind,
  pub raw_identity_number: String,
}

/// `POST /ingest/check` — normalize and test a number for uniqueness
/// without writing anything. The number itself is never echoed back.
pub async fn check<R, D>(
  State(state): State<AppState<R, D>>,
  Json(body): Json<CheckBody>,
) -> Result<Json<Uniqueness>, ApiError>
where
  R: RegistryStore,
  R::Error: std::error::Error + Send + Sync + 'static,
  D: DocumentStore,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  let number = IdentityNumber::normalize(body.kind, &body.raw_identity_number)?;
  let uniqueness = state.ingestor.check_uniqueness(body.kind, &number).await?;
  Ok(Json(uniqueness))
}
