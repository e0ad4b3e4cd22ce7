//! Evidence records, one per identity verification event.
//!
//! A record's fields may change over its lifetime, but every save appends a
//! [`HistoryEntry`]. History is never rewritten; deleting the whole record
//! is the only way to retract evidence. The identity assurance level is not
//! stored anywhere: it is re-derived from the records on every read (see
//! [`crate::trust`]).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, subject::SubjectId};

// ─── Enumerations ────────────────────────────────────────────────────────────

/// What a save does to the subject's identity assurance. The action only
/// annotates history; the derived level follows from the classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EvidenceAction {
  /// Detail edit with no level transition.
  #[default]
  #[serde(rename = "NONE", alias = "")]
  None,
  /// Verify identity: IAL 1 to 2. Requires a classification.
  #[serde(rename = "1-TO-2")]
  Upgrade,
  /// Administrative downgrade: IAL 2 to 1. Clears the classification.
  #[serde(rename = "2-TO-1")]
  Downgrade,
  #[serde(rename = "UPDATE")]
  Update,
}

impl EvidenceAction {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::None => "NONE",
      Self::Upgrade => "1-TO-2",
      Self::Downgrade => "2-TO-1",
      Self::Update => "UPDATE",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "NONE" | "" => Some(Self::None),
      "1-TO-2" => Some(Self::Upgrade),
      "2-TO-1" => Some(Self::Downgrade),
      "UPDATE" => Some(Self::Update),
      _ => None,
    }
  }
}

/// How the identity proofing was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofingMode {
  Remote,
  InPerson,
  #[default]
  Unspecified,
}

impl ProofingMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Remote => "remote",
      Self::InPerson => "in_person",
      Self::Unspecified => "unspecified",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "remote" => Some(Self::Remote),
      "in_person" => Some(Self::InPerson),
      "unspecified" => Some(Self::Unspecified),
      _ => None,
    }
  }
}

// ─── Structured details ──────────────────────────────────────────────────────

/// An identity document inspected by the verifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdDocument {
  /// e.g. `driving_permit`, `idcard`, `passport`.
  pub document_type:    String,
  pub issuer_name:      Option<String>,
  pub issuer_country:   Option<String>,
  pub issuer_region:    Option<String>,
  pub number:           Option<String>,
  pub date_of_issuance: Option<NaiveDate>,
  pub date_of_expiry:   Option<NaiveDate>,
}

/// A utility bill used as proof of address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilityBill {
  pub provider_name:  String,
  pub street_address: Option<String>,
  pub locality:       Option<String>,
  pub region:         Option<String>,
  pub postal_code:    Option<String>,
  pub country:        Option<String>,
  pub date:           Option<NaiveDate>,
}

/// The structured payload meaningful for the record's evidence type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceDetails {
  #[default]
  None,
  IdDocument(IdDocument),
  UtilityBill(UtilityBill),
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Deployment policy: the accepted classification and evidence type values.
///
/// Values are opaque. The only distinction that carries meaning elsewhere is
/// empty versus non-empty classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidencePolicy {
  pub classifications: Vec<String>,
  pub evidence_types:  Vec<String>,
}

impl Default for EvidencePolicy {
  fn default() -> Self {
    Self {
      classifications: [
        "ONE-SUPERIOR-OR-STRONG-PLUS",
        "ONE-STRONG-TWO-FAIR",
        "TWO-STRONG",
        "TRUSTED-REFEREE-VOUCH",
        "KBA",
      ]
      .map(String::from)
      .to_vec(),
      evidence_types:  ["ID_DOCUMENT", "UTILITY_BILL"].map(String::from).to_vec(),
    }
  }
}

impl EvidencePolicy {
  /// The empty classification is always accepted.
  pub fn check_classification(&self, value: &str) -> Result<()> {
    if value.is_empty() || self.classifications.iter().any(|c| c == value) {
      Ok(())
    } else {
      Err(Error::InvalidEvidenceClassification {
        field: "classification",
        value: value.to_owned(),
      })
    }
  }

  /// The empty evidence type is always accepted.
  pub fn check_evidence_type(&self, value: &str) -> Result<()> {
    if value.is_empty() || self.evidence_types.iter().any(|t| t == value) {
      Ok(())
    } else {
      Err(Error::InvalidEvidenceType {
        field: "evidence_type",
        value: value.to_owned(),
      })
    }
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

/// One append-only audit entry, written on every save of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
  /// 1-based position in the record's history.
  pub sequence:             u32,
  /// The subject the evidence is about, captured at save time.
  pub subject_id:           SubjectId,
  pub verifying_subject_id: Option<SubjectId>,
  pub action:               EvidenceAction,
  /// The verification or downgrade description, for actions that have one.
  pub description:          Option<String>,
  pub recorded_at:          DateTime<Utc>,
}

// ─── Record ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
  pub record_id:            Uuid,
  pub subject_id:           SubjectId,
  /// Absent for self-service or automatic grants.
  pub verifying_subject_id: Option<SubjectId>,
  pub action:               EvidenceAction,
  /// Empty means no elevating evidence is attached.
  pub classification:       String,
  pub evidence_type:        String,
  pub proofing_mode:        ProofingMode,
  pub details:              EvidenceDetails,
  pub description:          Option<String>,
  pub note:                 Option<String>,
  /// After this date the record no longer counts toward IAL 2.
  pub expires_at:           Option<NaiveDate>,
  pub verified_on:          Option<NaiveDate>,
  pub created_at:           DateTime<Utc>,
  pub updated_at:           DateTime<Utc>,
  pub history:              Vec<HistoryEntry>,
}

impl EvidenceRecord {
  /// Build a new record from `input`, with its first history entry.
  pub fn create(record_id: Uuid, input: NewEvidence, now: DateTime<Utc>) -> Result<Self> {
    check_transition(
      input.action,
      &input.classification,
      &input.subject_id,
      input.verifying_subject_id.as_ref(),
    )?;

    let mut record = Self {
      record_id,
      subject_id: input.subject_id,
      verifying_subject_id: input.verifying_subject_id,
      action: input.action,
      classification: input.classification,
      evidence_type: input.evidence_type,
      proofing_mode: input.proofing_mode,
      details: input.details,
      description: input.description,
      note: input.note,
      expires_at: input.expires_at,
      verified_on: input.verified_on,
      created_at: now,
      updated_at: now,
      history: Vec::new(),
    };
    record.finish_save(now);
    Ok(record)
  }

  /// Apply `change` as one save: merge fields, enforce the action's rules and
  /// append exactly one history entry. On error the record is untouched.
  pub fn apply(&mut self, change: EvidenceChange, now: DateTime<Utc>) -> Result<()> {
    let classification = change
      .classification
      .unwrap_or_else(|| self.classification.clone());
    check_transition(
      change.action,
      &classification,
      &self.subject_id,
      change.verifying_subject_id.as_ref(),
    )?;

    self.verifying_subject_id = change.verifying_subject_id;
    self.action = change.action;
    self.classification = classification;
    if let Some(evidence_type) = change.evidence_type {
      self.evidence_type = evidence_type;
    }
    if let Some(mode) = change.proofing_mode {
      self.proofing_mode = mode;
    }
    if let Some(details) = change.details {
      self.details = details;
    }
    if change.description.is_some() {
      self.description = change.description;
    }
    if change.note.is_some() {
      self.note = change.note;
    }
    if change.expires_at.is_some() {
      self.expires_at = change.expires_at;
    }
    if change.verified_on.is_some() {
      self.verified_on = change.verified_on;
    }
    self.updated_at = now;
    self.finish_save(now);
    Ok(())
  }

  /// Downgrade clearing plus the mandatory history append.
  fn finish_save(&mut self, now: DateTime<Utc>) {
    if self.action == EvidenceAction::Downgrade {
      self.classification.clear();
    }
    let description = match self.action {
      EvidenceAction::Upgrade | EvidenceAction::Downgrade => self.description.clone(),
      EvidenceAction::None | EvidenceAction::Update => None,
    };
    let entry = HistoryEntry {
      sequence: self.history.len() as u32 + 1,
      subject_id: self.subject_id.clone(),
      verifying_subject_id: self.verifying_subject_id.clone(),
      action: self.action,
      description,
      recorded_at: now,
    };
    self.history.push(entry);
  }

  pub fn is_expired_on(&self, today: NaiveDate) -> bool {
    self.expires_at.is_some_and(|expires| expires < today)
  }

  /// Whether this record lifts the subject to IAL 2 on `today`.
  pub fn elevates_on(&self, today: NaiveDate) -> bool {
    !self.classification.is_empty() && !self.is_expired_on(today)
  }

  /// The most recently appended history entry.
  pub fn latest_entry(&self) -> Option<&HistoryEntry> { self.history.last() }
}

fn check_transition(
  action: EvidenceAction,
  classification: &str,
  subject_id: &SubjectId,
  verifier: Option<&SubjectId>,
) -> Result<()> {
  if action != EvidenceAction::Upgrade {
    return Ok(());
  }
  if classification.is_empty() {
    return Err(Error::ClassificationRequired);
  }
  if verifier == Some(subject_id) {
    return Err(Error::SelfVerification(subject_id.clone()));
  }
  Ok(())
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::IdentityStore::record_evidence`].
/// Identifiers and timestamps are assigned by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvidence {
  pub subject_id:           SubjectId,
  #[serde(default)]
  pub verifying_subject_id: Option<SubjectId>,
  #[serde(default)]
  pub action:               EvidenceAction,
  #[serde(default)]
  pub classification:       String,
  #[serde(default)]
  pub evidence_type:        String,
  #[serde(default)]
  pub proofing_mode:        ProofingMode,
  /// Independent of `evidence_type`: when both are set and disagree, the
  /// details decide the kind reported in `verified_claims`.
  #[serde(default)]
  pub details:              EvidenceDetails,
  #[serde(default)]
  pub description:          Option<String>,
  #[serde(default)]
  pub note:                 Option<String>,
  #[serde(default)]
  pub expires_at:           Option<NaiveDate>,
  #[serde(default)]
  pub verified_on:          Option<NaiveDate>,
}

impl NewEvidence {
  /// Convenience constructor with all optional fields empty.
  pub fn new(subject_id: SubjectId, action: EvidenceAction) -> Self {
    Self {
      subject_id,
      verifying_subject_id: None,
      action,
      classification: String::new(),
      evidence_type: String::new(),
      proofing_mode: ProofingMode::default(),
      details: EvidenceDetails::default(),
      description: None,
      note: None,
      expires_at: None,
      verified_on: None,
    }
  }

  /// Check configured values and the action's rules.
  pub fn validate(&self, policy: &EvidencePolicy) -> Result<()> {
    policy.check_classification(&self.classification)?;
    policy.check_evidence_type(&self.evidence_type)?;
    check_transition(
      self.action,
      &self.classification,
      &self.subject_id,
      self.verifying_subject_id.as_ref(),
    )
  }
}

/// A save against an existing record. `None` fields keep their current
/// value, except `verifying_subject_id`, which always names who performed
/// this save.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EvidenceChange {
  pub verifying_subject_id: Option<SubjectId>,
  pub action:               EvidenceAction,
  pub classification:       Option<String>,
  pub evidence_type:        Option<String>,
  pub proofing_mode:        Option<ProofingMode>,
  pub details:              Option<EvidenceDetails>,
  pub description:          Option<String>,
  pub note:                 Option<String>,
  pub expires_at:           Option<NaiveDate>,
  pub verified_on:          Option<NaiveDate>,
}

impl EvidenceChange {
  pub fn new(action: EvidenceAction) -> Self {
    Self { action, ..Default::default() }
  }

  /// Check configured values. Action rules need the current record and are
  /// enforced by [`EvidenceRecord::apply`].
  pub fn validate(&self, policy: &EvidencePolicy) -> Result<()> {
    if let Some(classification) = &self.classification {
      policy.check_classification(classification)?;
    }
    if let Some(evidence_type) = &self.evidence_type {
      policy.check_evidence_type(evidence_type)?;
    }
    Ok(())
  }
}
