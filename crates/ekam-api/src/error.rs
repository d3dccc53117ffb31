//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler. Messages never contain identity
/// numbers; the domain errors they wrap already omit them.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
      ApiError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

impl From<ekam_core::Error> for ApiError {
  fn from(e: ekam_core::Error) -> Self {
    use ekam_core::Error as E;
    match e {
      E::InvalidFormat { .. } | E::UnknownDocumentKind(_) | E::UnknownField { .. } => {
        ApiError::BadRequest(e.to_string())
      }
      E::DetectionUnavailable(_)
      | E::RegistryUnavailable(_)
      | E::StoreUnavailable { .. } => ApiError::Unavailable(e.to_string()),
    }
  }
}

impl From<ekam_migrate::Error> for ApiError {
  fn from(e: ekam_migrate::Error) -> Self {
    use ekam_migrate::Error as E;
    match e {
      E::ConstraintViolation { .. } | E::PartialFailure { .. } => {
        ApiError::Conflict(e.to_string())
      }
      E::UnknownStep(_) | E::UnknownStore(_) => ApiError::BadRequest(e.to_string()),
      other => ApiError::Internal(Box::new(other)),
    }
  }
}
