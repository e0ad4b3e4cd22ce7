//! Error types for `assura-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::subject::SubjectId;

/// A boxed, thread-safe error from an underlying storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// Every candidate identifier collided with an existing subject.
  /// Retryable: the namespace is not exhausted, the attempts were.
  #[error("identifier allocation gave up after {attempts} colliding candidates")]
  IdentifierCollisionExhausted { attempts: u32 },

  #[error("invalid identifier configuration: {0}")]
  InvalidIdentifierConfig(String),

  /// The store could not be read or written. Never converted into a
  /// default trust level.
  #[error("evidence ledger unavailable: {0}")]
  LedgerUnavailable(#[source] BoxError),

  #[error("invalid {field}: {value:?} is not a configured classification")]
  InvalidEvidenceClassification { field: &'static str, value: String },

  #[error("invalid {field}: {value:?} is not a configured evidence type")]
  InvalidEvidenceType { field: &'static str, value: String },

  #[error("a 1-TO-2 upgrade requires a non-empty evidence classification")]
  ClassificationRequired,

  #[error("subject {0} cannot upgrade their own identity assurance level")]
  SelfVerification(SubjectId),

  #[error("subject not found: {0}")]
  SubjectNotFound(SubjectId),

  /// The credential id is already registered to another subject.
  #[error("credential {credential_id:?} is registered to a different subject")]
  CredentialInUse { credential_id: String },

  #[error("evidence record not found: {0}")]
  EvidenceNotFound(Uuid),

  #[error("claims for subject {0} are missing the mandatory `sub` claim")]
  MissingMandatoryClaim(SubjectId),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a backend failure as [`Error::LedgerUnavailable`].
  pub fn ledger<E>(error: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::LedgerUnavailable(Box::new(error))
  }

  /// Infrastructure failures that a caller may retry unchanged.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      Self::IdentifierCollisionExhausted { .. } | Self::LedgerUnavailable(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
