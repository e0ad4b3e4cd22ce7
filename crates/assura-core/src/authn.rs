//! Authentication factor sources that feed the AAL.
//!
//! Registered hardware authenticators and upstream identity provider
//! assertions are recorded as-is. Their authenticity is established by the
//! FIDO and OIDC layers before they reach this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{subject::SubjectId, trust::Level};

/// A registered FIDO credential. Only its existence matters here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticator {
  pub credential_id: String,
  pub subject_id:    SubjectId,
  pub name:          String,
  pub registered_at: DateTime<Utc>,
}

/// Input to [`crate::store::IdentityStore::register_authenticator`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewAuthenticator {
  pub credential_id: String,
  pub subject_id:    SubjectId,
  #[serde(default)]
  pub name:          String,
}

/// What an upstream identity provider asserted about its last
/// authentication of the subject. One record per (subject, provider).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamAssurance {
  pub subject_id:  SubjectId,
  pub provider:    String,
  pub aal:         Level,
  /// Authentication method references, e.g. `["pwd", "otp"]`.
  pub amr:         Vec<String>,
  pub asserted_at: DateTime<Utc>,
}

/// Input to [`crate::store::IdentityStore::put_upstream_assurance`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewUpstreamAssurance {
  pub subject_id: SubjectId,
  pub provider:   String,
  pub aal:        Level,
  #[serde(default)]
  pub amr:        Vec<String>,
}

/// The record asserting the highest AAL; ties go to the latest assertion.
pub fn strongest(records: &[UpstreamAssurance]) -> Option<&UpstreamAssurance> {
  records.iter().max_by_key(|r| (r.aal, r.asserted_at))
}
