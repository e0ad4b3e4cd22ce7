//! Trust level derivation: IAL, AAL and the Vector of Trust.
//!
//! Nothing here is cached. Every call re-reads the subject's evidence and
//! authentication factors so the derived level can never drift from the
//! records it came from.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

use crate::{
  Result,
  authn::UpstreamAssurance,
  evidence::EvidenceRecord,
  store::{EvidenceFilter, IdentityStore, ledger_err},
  subject::SubjectId,
};

/// An assurance level, shared by IAL and AAL. Ordered so that the stronger
/// level compares greater.
///
/// `Three` exists in the domain but no IAL policy produces it. It can only
/// appear as an AAL asserted by an upstream provider.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize,
  Deserialize,
)]
pub enum Level {
  #[default]
  #[serde(rename = "1")]
  One,
  #[serde(rename = "2")]
  Two,
  #[serde(rename = "3")]
  Three,
}

impl Level {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::One => "1",
      Self::Two => "2",
      Self::Three => "3",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "1" => Some(Self::One),
      "2" => Some(Self::Two),
      "3" => Some(Self::Three),
      _ => None,
    }
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// RFC 8485 vector of the identity proofing (`P`) and credential strength
/// (`C`) components, rendered as `P{ial}.C{aal}`. Both segments are always
/// present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorOfTrust {
  ial: Level,
  aal: Level,
}

impl VectorOfTrust {
  pub fn new(ial: Level, aal: Level) -> Self { Self { ial, aal } }
}

impl fmt::Display for VectorOfTrust {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "P{}.C{}", self.ial, self.aal)
  }
}

impl Serialize for VectorOfTrust {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// The computed trust metrics for a subject. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DerivedTrustLevel {
  pub ial: Level,
  pub aal: Level,
  pub vot: VectorOfTrust,
}

impl DerivedTrustLevel {
  pub fn new(ial: Level, aal: Level) -> Self {
    Self { ial, aal, vot: VectorOfTrust::new(ial, aal) }
  }
}

impl Default for DerivedTrustLevel {
  fn default() -> Self { Self::new(Level::One, Level::One) }
}

/// IAL 2 if any record carries a classification and is unexpired on
/// `today`, IAL 1 otherwise.
pub fn derive_ial<'a>(
  records: impl IntoIterator<Item = &'a EvidenceRecord>,
  today: NaiveDate,
) -> Level {
  if records.into_iter().any(|r| r.elevates_on(today)) {
    Level::Two
  } else {
    Level::One
  }
}

/// The highest AAL any source attests: a registered hardware authenticator
/// attests 2, each upstream record attests its own value.
pub fn derive_aal(authenticator_count: usize, upstream: &[UpstreamAssurance]) -> Level {
  let local = if authenticator_count > 0 { Level::Two } else { Level::One };
  upstream.iter().map(|u| u.aal).fold(local, Ord::max)
}

/// Compute the trust level of `subject_id` as of `today`.
///
/// Store failures propagate as [`crate::Error::LedgerUnavailable`]; they are
/// never mistaken for "no evidence".
pub async fn compute_trust_level<S: IdentityStore>(
  store: &S,
  subject_id: &SubjectId,
  today: NaiveDate,
) -> Result<DerivedTrustLevel> {
  let evidence = store
    .evidence_for(subject_id.clone(), EvidenceFilter::QualifyingOn(today))
    .await
    .map_err(ledger_err)?;
  let authenticators = store
    .authenticators(subject_id.clone())
    .await
    .map_err(ledger_err)?;
  let upstream = store
    .upstream_assurance(subject_id.clone())
    .await
    .map_err(ledger_err)?;

  Ok(DerivedTrustLevel::new(
    derive_ial(&evidence, today),
    derive_aal(authenticators.len(), &upstream),
  ))
}
