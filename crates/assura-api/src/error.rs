//! API error type and [`axum::response::IntoResponse`] implementation.

use assura_core::Error as CoreError;
use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] CoreError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Core(e) => match e {
        CoreError::InvalidEvidenceClassification { .. }
        | CoreError::InvalidEvidenceType { .. }
        | CoreError::ClassificationRequired => StatusCode::BAD_REQUEST,
        CoreError::SubjectNotFound(_) | CoreError::EvidenceNotFound(_) => {
          StatusCode::NOT_FOUND
        }
        CoreError::SelfVerification(_) | CoreError::CredentialInUse { .. } => {
          StatusCode::CONFLICT
        }
        CoreError::LedgerUnavailable(_)
        | CoreError::IdentifierCollisionExhausted { .. } => {
          StatusCode::SERVICE_UNAVAILABLE
        }
        CoreError::MissingMandatoryClaim(_)
        | CoreError::InvalidIdentifierConfig(_)
        | CoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

/// Lift a store backend error into an [`ApiError`].
pub(crate) fn store_err<E: Into<CoreError>>(e: E) -> ApiError { ApiError::Core(e.into()) }

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = match &self {
      ApiError::NotFound(m) | ApiError::BadRequest(m) => m.clone(),
      ApiError::Core(e) => e.to_string(),
    };
    if status.is_server_error() {
      error!(%status, error = %message, "request failed");
    }
    (status, Json(json!({ "error": message }))).into_response()
  }
}
