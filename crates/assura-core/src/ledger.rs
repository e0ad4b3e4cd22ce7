//! Evidence ledger operations.
//!
//! Thin wrappers over [`IdentityStore`] that validate writes against the
//! deployment [`EvidencePolicy`] before they reach the store, and turn
//! "not found" into typed errors.

use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result,
  evidence::{EvidenceChange, EvidencePolicy, EvidenceRecord, NewEvidence},
  store::{EvidenceFilter, IdentityStore, ledger_err},
  subject::SubjectId,
};

/// Record a new piece of evidence for `input.subject_id`.
pub async fn record_evidence<S: IdentityStore>(
  store: &S,
  policy: &EvidencePolicy,
  input: NewEvidence,
) -> Result<EvidenceRecord> {
  input.validate(policy)?;
  ensure_subject(store, &input.subject_id).await?;
  if let Some(verifier) = &input.verifying_subject_id {
    ensure_subject(store, verifier).await?;
  }

  let record = store.record_evidence(input).await.map_err(ledger_err)?;
  info!(
    record = %record.record_id,
    subject = %record.subject_id,
    action = record.action.as_str(),
    "evidence recorded"
  );
  Ok(record)
}

/// Apply `change` to an existing record, appending one history entry.
pub async fn update_evidence<S: IdentityStore>(
  store: &S,
  policy: &EvidencePolicy,
  record_id: Uuid,
  change: EvidenceChange,
) -> Result<EvidenceRecord> {
  change.validate(policy)?;
  if let Some(verifier) = &change.verifying_subject_id {
    ensure_subject(store, verifier).await?;
  }

  let record = store
    .update_evidence(record_id, change)
    .await
    .map_err(ledger_err)?
    .ok_or(Error::EvidenceNotFound(record_id))?;
  info!(
    record = %record.record_id,
    subject = %record.subject_id,
    action = record.action.as_str(),
    history = record.history.len(),
    "evidence updated"
  );
  Ok(record)
}

/// Delete a record. The subject's trust level is not touched here; it is
/// recomputed on the next read.
pub async fn delete_evidence<S: IdentityStore>(
  store: &S,
  record_id: Uuid,
) -> Result<EvidenceRecord> {
  let record = store
    .delete_evidence(record_id)
    .await
    .map_err(ledger_err)?
    .ok_or(Error::EvidenceNotFound(record_id))?;
  info!(record = %record_id, subject = %record.subject_id, "evidence deleted");
  Ok(record)
}

pub async fn get_evidence<S: IdentityStore>(store: &S, record_id: Uuid) -> Result<EvidenceRecord> {
  store
    .get_evidence(record_id)
    .await
    .map_err(ledger_err)?
    .ok_or(Error::EvidenceNotFound(record_id))
}

/// Every record for a subject, elevating or not.
pub async fn evidence_for<S: IdentityStore>(
  store: &S,
  subject_id: &SubjectId,
) -> Result<Vec<EvidenceRecord>> {
  store
    .evidence_for(subject_id.clone(), EvidenceFilter::All)
    .await
    .map_err(ledger_err)
}

async fn ensure_subject<S: IdentityStore>(store: &S, id: &SubjectId) -> Result<()> {
  if store.subject_exists(id.clone()).await.map_err(ledger_err)? {
    Ok(())
  } else {
    Err(Error::SubjectNotFound(id.clone()))
  }
}
