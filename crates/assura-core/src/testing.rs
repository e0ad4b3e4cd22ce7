//! Test doubles shared by this crate's unit tests.

use thiserror::Error;
use uuid::Uuid;

use crate::{
  authn::{Authenticator, NewAuthenticator, NewUpstreamAssurance, UpstreamAssurance},
  evidence::{EvidenceChange, EvidenceRecord, NewEvidence},
  profile::{Address, Affiliation, DocumentIdentifier, Profile, StoredProfile},
  store::{EvidenceFilter, IdentityStore},
  subject::{Subject, SubjectId, SubjectKind},
};

#[derive(Debug, Error)]
#[error("database is locked")]
pub struct Unavailable;

impl From<Unavailable> for crate::Error {
  fn from(error: Unavailable) -> Self { crate::Error::ledger(error) }
}

/// A store whose every read and write fails.
pub struct UnavailableStore;

type Result<T> = std::result::Result<T, Unavailable>;

impl IdentityStore for UnavailableStore {
  type Error = Unavailable;

  async fn subject_exists(&self, _: SubjectId) -> Result<bool> { Err(Unavailable) }

  async fn try_add_subject(&self, _: SubjectId, _: SubjectKind) -> Result<Option<Subject>> {
    Err(Unavailable)
  }

  async fn get_subject(&self, _: SubjectId) -> Result<Option<Subject>> { Err(Unavailable) }

  async fn list_subjects(&self, _: Option<SubjectKind>) -> Result<Vec<Subject>> {
    Err(Unavailable)
  }

  async fn put_profile(&self, _: SubjectId, _: Profile) -> Result<StoredProfile> {
    Err(Unavailable)
  }

  async fn get_profile(&self, _: SubjectId) -> Result<Option<StoredProfile>> { Err(Unavailable) }

  async fn add_address(&self, _: SubjectId, _: Address) -> Result<()> { Err(Unavailable) }

  async fn addresses(&self, _: SubjectId) -> Result<Vec<Address>> { Err(Unavailable) }

  async fn add_document(&self, _: SubjectId, _: DocumentIdentifier) -> Result<()> {
    Err(Unavailable)
  }

  async fn documents(&self, _: SubjectId) -> Result<Vec<DocumentIdentifier>> { Err(Unavailable) }

  async fn add_affiliation(&self, _: SubjectId, _: Affiliation) -> Result<()> { Err(Unavailable) }

  async fn affiliations(&self, _: SubjectId) -> Result<Vec<Affiliation>> { Err(Unavailable) }

  async fn record_evidence(&self, _: NewEvidence) -> Result<EvidenceRecord> { Err(Unavailable) }

  async fn update_evidence(&self, _: Uuid, _: EvidenceChange) -> Result<Option<EvidenceRecord>> {
    Err(Unavailable)
  }

  async fn delete_evidence(&self, _: Uuid) -> Result<Option<EvidenceRecord>> { Err(Unavailable) }

  async fn get_evidence(&self, _: Uuid) -> Result<Option<EvidenceRecord>> { Err(Unavailable) }

  async fn evidence_for(&self, _: SubjectId, _: EvidenceFilter) -> Result<Vec<EvidenceRecord>> {
    Err(Unavailable)
  }

  async fn register_authenticator(&self, _: NewAuthenticator) -> Result<Authenticator> {
    Err(Unavailable)
  }

  async fn remove_authenticator(&self, _: String) -> Result<bool> { Err(Unavailable) }

  async fn authenticators(&self, _: SubjectId) -> Result<Vec<Authenticator>> { Err(Unavailable) }

  async fn put_upstream_assurance(&self, _: NewUpstreamAssurance) -> Result<UpstreamAssurance> {
    Err(Unavailable)
  }

  async fn upstream_assurance(&self, _: SubjectId) -> Result<Vec<UpstreamAssurance>> {
    Err(Unavailable)
  }
}
