//! Handlers for the per-subject data the claim providers read.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/subjects/:id/profile` | 404 if the subject has no profile yet |
//! | `PUT`    | `/subjects/:id/profile` | Body: [`Profile`]; verifying agent is kept |
//! | `POST`   | `/subjects/:id/addresses` | Body: [`Address`] |
//! | `POST`   | `/subjects/:id/documents` | Body: [`DocumentIdentifier`] |
//! | `POST`   | `/subjects/:id/affiliations` | Body: [`Affiliation`]; organization must exist |
//! | `POST`   | `/subjects/:id/authenticators` | Body: `{"credential_id":"..","name":".."}`; 409 if another subject holds the id |
//! | `DELETE` | `/authenticators/:credential_id` | 204, or 404 if unknown |
//! | `PUT`    | `/subjects/:id/upstream-assurance` | Body: `{"provider":"..","aal":"2","amr":[..]}` |

use assura_core::{
  authn::{Authenticator, NewAuthenticator, NewUpstreamAssurance, UpstreamAssurance},
  profile::{Address, Affiliation, DocumentIdentifier, Profile, StoredProfile},
  store::IdentityStore,
  subject::{SubjectId, SubjectKind},
  trust::Level,
};
use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;

use crate::{
  ApiState,
  error::{ApiError, store_err},
  subjects::ensure_subject,
};

// ─── Profile ──────────────────────────────────────────────────────────────────

/// `GET /subjects/:id/profile`
pub async fn get_profile<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<SubjectId>,
) -> Result<Json<StoredProfile>, ApiError>
where
  S: IdentityStore,
{
  ensure_subject(&state, &id).await?;
  let profile = state
    .store
    .get_profile(id.clone())
    .await
    .map_err(store_err)?
    .ok_or_else(|| ApiError::NotFound(format!("subject {id} has no profile")))?;
  Ok(Json(profile))
}

/// `PUT /subjects/:id/profile`
pub async fn put_profile<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<SubjectId>,
  Json(profile): Json<Profile>,
) -> Result<Json<StoredProfile>, ApiError>
where
  S: IdentityStore,
{
  ensure_subject(&state, &id).await?;
  let stored = state.store.put_profile(id, profile).await.map_err(store_err)?;
  Ok(Json(stored))
}

// ─── Ordered lists ────────────────────────────────────────────────────────────

/// `POST /subjects/:id/addresses`
pub async fn add_address<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<SubjectId>,
  Json(address): Json<Address>,
) -> Result<impl IntoResponse, ApiError>
where
  S: IdentityStore,
{
  ensure_subject(&state, &id).await?;
  state
    .store
    .add_address(id, address.clone())
    .await
    .map_err(store_err)?;
  Ok((StatusCode::CREATED, Json(address)))
}

/// `POST /subjects/:id/documents`
pub async fn add_document<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<SubjectId>,
  Json(document): Json<DocumentIdentifier>,
) -> Result<impl IntoResponse, ApiError>
where
  S: IdentityStore,
{
  ensure_subject(&state, &id).await?;
  state
    .store
    .add_document(id, document.clone())
    .await
    .map_err(store_err)?;
  Ok((StatusCode::CREATED, Json(document)))
}

/// `POST /subjects/:id/affiliations`
pub async fn add_affiliation<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<SubjectId>,
  Json(affiliation): Json<Affiliation>,
) -> Result<impl IntoResponse, ApiError>
where
  S: IdentityStore,
{
  ensure_subject(&state, &id).await?;
  let org_id = affiliation.organization_id.clone();
  let organization = state
    .store
    .get_subject(org_id.clone())
    .await
    .map_err(store_err)?
    .ok_or(ApiError::Core(assura_core::Error::SubjectNotFound(org_id.clone())))?;
  if organization.kind != SubjectKind::Organization {
    return Err(ApiError::BadRequest(format!(
      "subject {org_id} is not an organization"
    )));
  }

  state
    .store
    .add_affiliation(id, affiliation.clone())
    .await
    .map_err(store_err)?;
  Ok((StatusCode::CREATED, Json(affiliation)))
}

// ─── Authenticators ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuthenticatorBody {
  pub credential_id: String,
  #[serde(default)]
  pub name:          String,
}

/// `POST /subjects/:id/authenticators`
pub async fn register_authenticator<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<SubjectId>,
  Json(body): Json<AuthenticatorBody>,
) -> Result<(StatusCode, Json<Authenticator>), ApiError>
where
  S: IdentityStore,
{
  if body.credential_id.trim().is_empty() {
    return Err(ApiError::BadRequest("credential_id must not be empty".into()));
  }
  ensure_subject(&state, &id).await?;
  let authenticator = state
    .store
    .register_authenticator(NewAuthenticator {
      credential_id: body.credential_id,
      subject_id:    id,
      name:          body.name,
    })
    .await
    .map_err(store_err)?;
  Ok((StatusCode::CREATED, Json(authenticator)))
}

/// `DELETE /authenticators/:credential_id`
pub async fn remove_authenticator<S>(
  State(state): State<ApiState<S>>,
  Path(credential_id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: IdentityStore,
{
  let removed = state
    .store
    .remove_authenticator(credential_id.clone())
    .await
    .map_err(store_err)?;
  if removed {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("authenticator {credential_id} not found")))
  }
}

// ─── Upstream assurance ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpstreamBody {
  pub provider: String,
  pub aal:      Level,
  #[serde(default)]
  pub amr:      Vec<String>,
}

/// `PUT /subjects/:id/upstream-assurance`
pub async fn put_upstream<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<SubjectId>,
  Json(body): Json<UpstreamBody>,
) -> Result<Json<UpstreamAssurance>, ApiError>
where
  S: IdentityStore,
{
  if body.provider.trim().is_empty() {
    return Err(ApiError::BadRequest("provider must not be empty".into()));
  }
  ensure_subject(&state, &id).await?;
  let record = state
    .store
    .put_upstream_assurance(NewUpstreamAssurance {
      subject_id: id,
      provider:   body.provider,
      aal:        body.aal,
      amr:        body.amr,
    })
    .await
    .map_err(store_err)?;
  Ok(Json(record))
}
