//! JSON REST API for Assura.
//!
//! Exposes an axum [`Router`] backed by any [`IdentityStore`]. Auth, TLS and
//! OIDC token mechanics are the caller's responsibility; this crate only
//! serves subjects, evidence, trust levels and the aggregated claim set.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", assura_api::api_router(state))
//! ```

pub mod assurance;
pub mod error;
pub mod evidence;
pub mod profile;
pub mod subjects;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use assura_core::{
  claims::ClaimRegistry, evidence::EvidencePolicy, identifier::IdentifierGenerator,
  store::IdentityStore,
};
use axum::{
  Router,
  routing::{delete, get, post, put},
};

pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:     Arc<S>,
  pub generator: Arc<IdentifierGenerator>,
  pub policy:    Arc<EvidencePolicy>,
  pub registry:  Arc<ClaimRegistry>,
}

// Derived `Clone` would demand `S: Clone`.
impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:     self.store.clone(),
      generator: self.generator.clone(),
      policy:    self.policy.clone(),
      registry:  self.registry.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: IdentityStore + 'static,
{
  Router::new()
    // Subjects
    .route("/subjects", get(subjects::list::<S>).post(subjects::create::<S>))
    .route("/subjects/{id}", get(subjects::get_one::<S>))
    // Profile data
    .route(
      "/subjects/{id}/profile",
      get(profile::get_profile::<S>).put(profile::put_profile::<S>),
    )
    .route("/subjects/{id}/addresses",    post(profile::add_address::<S>))
    .route("/subjects/{id}/documents",    post(profile::add_document::<S>))
    .route("/subjects/{id}/affiliations", post(profile::add_affiliation::<S>))
    // Authentication factors
    .route("/subjects/{id}/authenticators", post(profile::register_authenticator::<S>))
    .route("/authenticators/{credential_id}", delete(profile::remove_authenticator::<S>))
    .route("/subjects/{id}/upstream-assurance", put(profile::put_upstream::<S>))
    // Evidence
    .route("/evidence", get(evidence::list::<S>).post(evidence::create::<S>))
    .route(
      "/evidence/{id}",
      get(evidence::get_one::<S>)
        .patch(evidence::update::<S>)
        .delete(evidence::delete_one::<S>),
    )
    // Derived views
    .route("/subjects/{id}/trust-level", get(assurance::trust_level::<S>))
    .route("/subjects/{id}/claims",      get(assurance::claims::<S>))
    .with_state(state)
}
