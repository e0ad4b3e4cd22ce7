//! Derived, read-only views of a subject.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/subjects/:id/trust-level` | `{"ial":"2","aal":"1","vot":"P2.C1"}` as of today (UTC) |
//! | `GET`  | `/subjects/:id/claims` | Aggregated claim map with an `ETag` |
//!
//! Neither endpoint writes anything.

use assura_core::{
  store::IdentityStore,
  subject::SubjectId,
  trust::{DerivedTrustLevel, compute_trust_level},
};
use axum::{
  Json,
  extract::{Path, State},
  http::header,
  response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};

use crate::{ApiState, error::ApiError, subjects::ensure_subject};

fn today() -> NaiveDate { Utc::now().date_naive() }

/// `GET /subjects/:id/trust-level`
pub async fn trust_level<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<SubjectId>,
) -> Result<Json<DerivedTrustLevel>, ApiError>
where
  S: IdentityStore,
{
  ensure_subject(&state, &id).await?;
  let level = compute_trust_level(state.store.as_ref(), &id, today()).await?;
  Ok(Json(level))
}

/// `GET /subjects/:id/claims`
pub async fn claims<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<SubjectId>,
) -> Result<impl IntoResponse, ApiError>
where
  S: IdentityStore,
{
  ensure_subject(&state, &id).await?;
  let claims = state.registry.aggregate(&id, today()).await?;
  let body = claims.to_json_bytes()?;
  let etag = compute_etag(&body);
  Ok((
    [(header::CONTENT_TYPE, "application/json".to_string()), (header::ETAG, etag)],
    body,
  ))
}

/// Quoted hex SHA-256 of a serialized claim set.
///
/// Stable because claim maps keep their insertion order.
pub fn compute_etag(serialized: &[u8]) -> String {
  let hash = Sha256::digest(serialized);
  format!("\"{}\"", hex::encode(hash))
}
