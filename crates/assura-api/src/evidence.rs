//! Handlers for `/evidence` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/evidence` | `?subject_id` required; every record with its history |
//! | `POST`   | `/evidence` | Body: [`NewEvidence`]; returns 201 + stored record |
//! | `GET`    | `/evidence/:id` | Single record |
//! | `PATCH`  | `/evidence/:id` | Body: [`EvidenceChange`]; appends one history entry |
//! | `DELETE` | `/evidence/:id` | Returns the removed record |

use assura_core::{
  evidence::{EvidenceChange, EvidenceRecord, NewEvidence},
  ledger,
  store::IdentityStore,
  subject::SubjectId,
};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError, subjects::ensure_subject};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub subject_id: SubjectId,
}

/// `GET /evidence?subject_id=<id>`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<EvidenceRecord>>, ApiError>
where
  S: IdentityStore,
{
  ensure_subject(&state, &params.subject_id).await?;
  let records = ledger::evidence_for(state.store.as_ref(), &params.subject_id).await?;
  Ok(Json(records))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /evidence`
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<NewEvidence>,
) -> Result<impl IntoResponse, ApiError>
where
  S: IdentityStore,
{
  let record = ledger::record_evidence(state.store.as_ref(), &state.policy, body).await?;
  Ok((StatusCode::CREATED, Json(record)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /evidence/:id`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<EvidenceRecord>, ApiError>
where
  S: IdentityStore,
{
  Ok(Json(ledger::get_evidence(state.store.as_ref(), id).await?))
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// `PATCH /evidence/:id`
pub async fn update<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
  Json(change): Json<EvidenceChange>,
) -> Result<Json<EvidenceRecord>, ApiError>
where
  S: IdentityStore,
{
  let record = ledger::update_evidence(state.store.as_ref(), &state.policy, id, change).await?;
  Ok(Json(record))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /evidence/:id`
pub async fn delete_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<EvidenceRecord>, ApiError>
where
  S: IdentityStore,
{
  Ok(Json(ledger::delete_evidence(state.store.as_ref(), id).await?))
}
