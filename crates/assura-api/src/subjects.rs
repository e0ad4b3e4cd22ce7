//! Handlers for `/subjects` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/subjects` | Optional `?kind=person\|organization` |
//! | `POST` | `/subjects` | Body: `{"kind":"person","chosen_digits":"42"}` |
//! | `GET`  | `/subjects/:id` | 404 if not found |

use assura_core::{
  identifier,
  store::IdentityStore,
  subject::{Subject, SubjectId, SubjectKind},
};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;

use crate::{
  ApiState,
  error::{ApiError, store_err},
};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub kind: Option<SubjectKind>,
}

/// `GET /subjects[?kind=<kind>]`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Subject>>, ApiError>
where
  S: IdentityStore,
{
  let subjects = state
    .store
    .list_subjects(params.kind)
    .await
    .map_err(store_err)?;
  Ok(Json(subjects))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub kind:          SubjectKind,
  /// Digits placed right after the kind digit. Non-numeric input is ignored.
  #[serde(default)]
  pub chosen_digits: String,
}

/// `POST /subjects`: body `{"kind":"person"}`
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: IdentityStore,
{
  let subject = identifier::create_subject(
    state.store.as_ref(),
    &state.generator,
    body.kind,
    &body.chosen_digits,
  )
  .await?;
  info!(subject = %subject.subject_id, kind = ?subject.kind, "subject created");
  Ok((StatusCode::CREATED, Json(subject)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /subjects/:id`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<SubjectId>,
) -> Result<Json<Subject>, ApiError>
where
  S: IdentityStore,
{
  let subject = state
    .store
    .get_subject(id.clone())
    .await
    .map_err(store_err)?
    .ok_or(ApiError::Core(assura_core::Error::SubjectNotFound(id)))?;
  Ok(Json(subject))
}

/// 404 unless `id` names an existing subject.
pub(crate) async fn ensure_subject<S>(state: &ApiState<S>, id: &SubjectId) -> Result<(), ApiError>
where
  S: IdentityStore,
{
  if state.store.subject_exists(id.clone()).await.map_err(store_err)? {
    Ok(())
  } else {
    Err(ApiError::Core(assura_core::Error::SubjectNotFound(id.clone())))
  }
}
