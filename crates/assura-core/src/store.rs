//! The `IdentityStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `assura-store-sqlite`).
//! Higher layers (`assura-api`, the claim providers) depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  Error,
  authn::{Authenticator, NewAuthenticator, NewUpstreamAssurance, UpstreamAssurance},
  evidence::{EvidenceChange, EvidenceRecord, NewEvidence},
  profile::{Address, Affiliation, DocumentIdentifier, Profile, StoredProfile},
  subject::{Subject, SubjectId, SubjectKind},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Selects which evidence records [`IdentityStore::evidence_for`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceFilter {
  /// Every record, elevating or not.
  All,
  /// Only records with a non-empty classification that have not expired on
  /// the given date. Backends filter at the data layer.
  QualifyingOn(NaiveDate),
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an Assura store backend.
///
/// Evidence history is append-only: [`record_evidence`] and
/// [`update_evidence`] each append exactly one entry, and backends must run
/// the read-modify-write of an update atomically per record.
///
/// Backend errors convert into [`Error`]. Infrastructure failures become
/// [`Error::LedgerUnavailable`]; domain rejections raised while applying a
/// change convert back into themselves.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
///
/// [`record_evidence`]: IdentityStore::record_evidence
/// [`update_evidence`]: IdentityStore::update_evidence
pub trait IdentityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<Error> + 'static;

  // ── Subjects ──────────────────────────────────────────────────────────

  fn subject_exists(
    &self,
    id: SubjectId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Insert a subject under `id`. Returns `None` if the identifier is
  /// already taken, as reported by the backend's uniqueness constraint.
  fn try_add_subject(
    &self,
    id: SubjectId,
    kind: SubjectKind,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  fn get_subject(
    &self,
    id: SubjectId,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  /// List all subjects, optionally filtered by kind.
  fn list_subjects(
    &self,
    kind: Option<SubjectKind>,
  ) -> impl Future<Output = Result<Vec<Subject>, Self::Error>> + Send + '_;

  // ── Profile data ──────────────────────────────────────────────────────

  /// Replace the profile fields. The verifying agent annotation is kept.
  fn put_profile(
    &self,
    subject_id: SubjectId,
    profile: Profile,
  ) -> impl Future<Output = Result<StoredProfile, Self::Error>> + Send + '_;

  fn get_profile(
    &self,
    subject_id: SubjectId,
  ) -> impl Future<Output = Result<Option<StoredProfile>, Self::Error>> + Send + '_;

  fn add_address(
    &self,
    subject_id: SubjectId,
    address: Address,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Addresses in insertion order.
  fn addresses(
    &self,
    subject_id: SubjectId,
  ) -> impl Future<Output = Result<Vec<Address>, Self::Error>> + Send + '_;

  fn add_document(
    &self,
    subject_id: SubjectId,
    document: DocumentIdentifier,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Document identifiers in insertion order.
  fn documents(
    &self,
    subject_id: SubjectId,
  ) -> impl Future<Output = Result<Vec<DocumentIdentifier>, Self::Error>> + Send + '_;

  fn add_affiliation(
    &self,
    subject_id: SubjectId,
    affiliation: Affiliation,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Affiliations in insertion order.
  fn affiliations(
    &self,
    subject_id: SubjectId,
  ) -> impl Future<Output = Result<Vec<Affiliation>, Self::Error>> + Send + '_;

  // ── Evidence ──────────────────────────────────────────────────────────

  /// Persist a new record built with [`EvidenceRecord::create`], and set the
  /// subject's verifying agent annotation when a verifier is named.
  fn record_evidence(
    &self,
    input: NewEvidence,
  ) -> impl Future<Output = Result<EvidenceRecord, Self::Error>> + Send + '_;

  /// Apply `change` with [`EvidenceRecord::apply`] under a per-record lock,
  /// updating the verifying agent annotation like `record_evidence` does.
  /// Returns `None` if the record does not exist.
  fn update_evidence(
    &self,
    record_id: Uuid,
    change: EvidenceChange,
  ) -> impl Future<Output = Result<Option<EvidenceRecord>, Self::Error>> + Send + '_;

  /// Remove a record with its history and clear the subject's verifying
  /// agent annotation. Returns the removed record, or `None` if absent.
  /// Re-deriving the trust level is the caller's business.
  fn delete_evidence(
    &self,
    record_id: Uuid,
  ) -> impl Future<Output = Result<Option<EvidenceRecord>, Self::Error>> + Send + '_;

  fn get_evidence(
    &self,
    record_id: Uuid,
  ) -> impl Future<Output = Result<Option<EvidenceRecord>, Self::Error>> + Send + '_;

  /// Records for a subject ordered by creation, each with its full history.
  fn evidence_for(
    &self,
    subject_id: SubjectId,
    filter: EvidenceFilter,
  ) -> impl Future<Output = Result<Vec<EvidenceRecord>, Self::Error>> + Send + '_;

  // ── Authentication factors ────────────────────────────────────────────

  /// Idempotent for the subject already holding `credential_id`. Fails with
  /// [`Error::CredentialInUse`] when another subject holds it.
  fn register_authenticator(
    &self,
    input: NewAuthenticator,
  ) -> impl Future<Output = Result<Authenticator, Self::Error>> + Send + '_;

  /// Returns `false` if no such credential was registered.
  fn remove_authenticator(
    &self,
    credential_id: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn authenticators(
    &self,
    subject_id: SubjectId,
  ) -> impl Future<Output = Result<Vec<Authenticator>, Self::Error>> + Send + '_;

  /// Insert or replace the record for `(subject_id, provider)`.
  fn put_upstream_assurance(
    &self,
    input: NewUpstreamAssurance,
  ) -> impl Future<Output = Result<UpstreamAssurance, Self::Error>> + Send + '_;

  fn upstream_assurance(
    &self,
    subject_id: SubjectId,
  ) -> impl Future<Output = Result<Vec<UpstreamAssurance>, Self::Error>> + Send + '_;
}

/// Convert a backend error for use with `?` in this crate.
pub(crate) fn ledger_err<E: Into<Error>>(error: E) -> Error { error.into() }
