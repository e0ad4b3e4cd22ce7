//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings and calendar dates as
//! `YYYY-MM-DD`, so both sort correctly as text. Structured values (evidence
//! details, list entries, `amr`) are stored as compact JSON. UUIDs are stored
//! as hyphenated lowercase strings.

use assura_core::{
  authn::{Authenticator, UpstreamAssurance},
  evidence::{EvidenceAction, EvidenceRecord, HistoryEntry, ProofingMode},
  profile::{Profile, StoredProfile},
  subject::{Subject, SubjectId, SubjectKind},
  trust::Level,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

fn unknown(column: &'static str, value: &str) -> Error {
  Error::UnknownValue { column, value: value.to_owned() }
}

// ─── Enumerations ────────────────────────────────────────────────────────────

pub fn encode_subject_kind(k: SubjectKind) -> &'static str {
  match k {
    SubjectKind::Person => "person",
    SubjectKind::Organization => "organization",
  }
}

pub fn decode_subject_kind(s: &str) -> Result<SubjectKind> {
  match s {
    "person" => Ok(SubjectKind::Person),
    "organization" => Ok(SubjectKind::Organization),
    other => Err(unknown("kind", other)),
  }
}

pub fn decode_action(s: &str) -> Result<EvidenceAction> {
  EvidenceAction::parse(s).ok_or_else(|| unknown("action", s))
}

pub fn decode_proofing_mode(s: &str) -> Result<ProofingMode> {
  ProofingMode::parse(s).ok_or_else(|| unknown("proofing_mode", s))
}

pub fn decode_level(s: &str) -> Result<Level> {
  Level::parse(s).ok_or_else(|| unknown("aal", s))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `subjects` row.
pub struct RawSubject {
  pub subject_id: String,
  pub kind:       String,
  pub created_at: String,
}

impl RawSubject {
  pub const COLUMNS: &'static str = "subject_id, kind, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subject_id: row.get(0)?,
      kind:       row.get(1)?,
      created_at: row.get(2)?,
    })
  }

  pub fn into_subject(self) -> Result<Subject> {
    Ok(Subject {
      subject_id: SubjectId::new(self.subject_id),
      kind:       decode_subject_kind(&self.kind)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read from a `profiles` row.
pub struct RawProfile {
  pub subject_id:      String,
  pub given_name:      Option<String>,
  pub family_name:     Option<String>,
  pub nickname:        Option<String>,
  pub birthdate:       Option<String>,
  pub gender:          Option<String>,
  pub email:           Option<String>,
  pub email_verified:  bool,
  pub phone_number:    Option<String>,
  pub phone_verified:  bool,
  pub verifying_agent: Option<String>,
  pub updated_at:      String,
}

impl RawProfile {
  pub const COLUMNS: &'static str = "subject_id, given_name, family_name, nickname, birthdate, \
                                     gender, email, email_verified, phone_number, phone_verified, \
                                     verifying_agent, updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subject_id:      row.get(0)?,
      given_name:      row.get(1)?,
      family_name:     row.get(2)?,
      nickname:        row.get(3)?,
      birthdate:       row.get(4)?,
      gender:          row.get(5)?,
      email:           row.get(6)?,
      email_verified:  row.get(7)?,
      phone_number:    row.get(8)?,
      phone_verified:  row.get(9)?,
      verifying_agent: row.get(10)?,
      updated_at:      row.get(11)?,
    })
  }

  pub fn into_stored(self) -> Result<StoredProfile> {
    Ok(StoredProfile {
      subject_id:      SubjectId::new(self.subject_id),
      profile:         Profile {
        given_name:     self.given_name,
        family_name:    self.family_name,
        nickname:       self.nickname,
        birthdate:      self.birthdate.as_deref().map(decode_date).transpose()?,
        gender:         self.gender,
        email:          self.email,
        email_verified: self.email_verified,
        phone_number:   self.phone_number,
        phone_verified: self.phone_verified,
      },
      verifying_agent: self.verifying_agent.map(SubjectId::new),
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read from an `evidence` row. History is loaded separately.
pub struct RawEvidence {
  pub record_id:            String,
  pub subject_id:           String,
  pub verifying_subject_id: Option<String>,
  pub action:               String,
  pub classification:       String,
  pub evidence_type:        String,
  pub proofing_mode:        String,
  pub details_json:         String,
  pub description:          Option<String>,
  pub note:                 Option<String>,
  pub expires_at:           Option<String>,
  pub verified_on:          Option<String>,
  pub created_at:           String,
  pub updated_at:           String,
}

impl RawEvidence {
  pub const COLUMNS: &'static str = "record_id, subject_id, verifying_subject_id, action, \
                                     classification, evidence_type, proofing_mode, details_json, \
                                     description, note, expires_at, verified_on, created_at, \
                                     updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:            row.get(0)?,
      subject_id:           row.get(1)?,
      verifying_subject_id: row.get(2)?,
      action:               row.get(3)?,
      classification:       row.get(4)?,
      evidence_type:        row.get(5)?,
      proofing_mode:        row.get(6)?,
      details_json:         row.get(7)?,
      description:          row.get(8)?,
      note:                 row.get(9)?,
      expires_at:           row.get(10)?,
      verified_on:          row.get(11)?,
      created_at:           row.get(12)?,
      updated_at:           row.get(13)?,
    })
  }

  pub fn into_record(self, history: Vec<RawHistory>) -> Result<EvidenceRecord> {
    Ok(EvidenceRecord {
      record_id:            decode_uuid(&self.record_id)?,
      subject_id:           SubjectId::new(self.subject_id),
      verifying_subject_id: self.verifying_subject_id.map(SubjectId::new),
      action:               decode_action(&self.action)?,
      classification:       self.classification,
      evidence_type:        self.evidence_type,
      proofing_mode:        decode_proofing_mode(&self.proofing_mode)?,
      details:              serde_json::from_str(&self.details_json)?,
      description:          self.description,
      note:                 self.note,
      expires_at:           self.expires_at.as_deref().map(decode_date).transpose()?,
      verified_on:          self.verified_on.as_deref().map(decode_date).transpose()?,
      created_at:           decode_dt(&self.created_at)?,
      updated_at:           decode_dt(&self.updated_at)?,
      history:              history
        .into_iter()
        .map(RawHistory::into_entry)
        .collect::<Result<_>>()?,
    })
  }
}

/// Column values for writing an [`EvidenceRecord`], in [`RawEvidence::COLUMNS`]
/// order.
pub struct EncodedEvidence {
  pub record_id:            String,
  pub subject_id:           String,
  pub verifying_subject_id: Option<String>,
  pub action:               &'static str,
  pub classification:       String,
  pub evidence_type:        String,
  pub proofing_mode:        &'static str,
  pub details_json:         String,
  pub description:          Option<String>,
  pub note:                 Option<String>,
  pub expires_at:           Option<String>,
  pub verified_on:          Option<String>,
  pub created_at:           String,
  pub updated_at:           String,
}

impl EncodedEvidence {
  pub fn new(record: &EvidenceRecord) -> Result<Self> {
    Ok(Self {
      record_id:            encode_uuid(record.record_id),
      subject_id:           record.subject_id.as_str().to_owned(),
      verifying_subject_id: record
        .verifying_subject_id
        .as_ref()
        .map(|v| v.as_str().to_owned()),
      action:               record.action.as_str(),
      classification:       record.classification.clone(),
      evidence_type:        record.evidence_type.clone(),
      proofing_mode:        record.proofing_mode.as_str(),
      details_json:         serde_json::to_string(&record.details)?,
      description:          record.description.clone(),
      note:                 record.note.clone(),
      expires_at:           record.expires_at.map(encode_date),
      verified_on:          record.verified_on.map(encode_date),
      created_at:           encode_dt(record.created_at),
      updated_at:           encode_dt(record.updated_at),
    })
  }
}

/// Raw strings read from an `evidence_history` row.
pub struct RawHistory {
  pub sequence:             u32,
  pub subject_id:           String,
  pub verifying_subject_id: Option<String>,
  pub action:               String,
  pub description:          Option<String>,
  pub recorded_at:          String,
}

impl RawHistory {
  pub const COLUMNS: &'static str =
    "sequence, subject_id, verifying_subject_id, action, description, recorded_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sequence:             row.get(0)?,
      subject_id:           row.get(1)?,
      verifying_subject_id: row.get(2)?,
      action:               row.get(3)?,
      description:          row.get(4)?,
      recorded_at:          row.get(5)?,
    })
  }

  pub fn into_entry(self) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
      sequence:             self.sequence,
      subject_id:           SubjectId::new(self.subject_id),
      verifying_subject_id: self.verifying_subject_id.map(SubjectId::new),
      action:               decode_action(&self.action)?,
      description:          self.description,
      recorded_at:          decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read from an `authenticators` row.
pub struct RawAuthenticator {
  pub credential_id: String,
  pub subject_id:    String,
  pub name:          String,
  pub registered_at: String,
}

impl RawAuthenticator {
  pub const COLUMNS: &'static str = "credential_id, subject_id, name, registered_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      credential_id: row.get(0)?,
      subject_id:    row.get(1)?,
      name:          row.get(2)?,
      registered_at: row.get(3)?,
    })
  }

  pub fn into_authenticator(self) -> Result<Authenticator> {
    Ok(Authenticator {
      credential_id: self.credential_id,
      subject_id:    SubjectId::new(self.subject_id),
      name:          self.name,
      registered_at: decode_dt(&self.registered_at)?,
    })
  }
}

/// Raw strings read from an `upstream_assurance` row.
pub struct RawUpstream {
  pub subject_id:  String,
  pub provider:    String,
  pub aal:         String,
  pub amr_json:    String,
  pub asserted_at: String,
}

impl RawUpstream {
  pub const COLUMNS: &'static str = "subject_id, provider, aal, amr_json, asserted_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subject_id:  row.get(0)?,
      provider:    row.get(1)?,
      aal:         row.get(2)?,
      amr_json:    row.get(3)?,
      asserted_at: row.get(4)?,
    })
  }

  pub fn into_upstream(self) -> Result<UpstreamAssurance> {
    Ok(UpstreamAssurance {
      subject_id:  SubjectId::new(self.subject_id),
      provider:    self.provider,
      aal:         decode_level(&self.aal)?,
      amr:         serde_json::from_str(&self.amr_json)?,
      asserted_at: decode_dt(&self.asserted_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dates_sort_as_text() {
    let early = encode_date(NaiveDate::from_ymd_opt(2024, 2, 9).unwrap());
    let late = encode_date(NaiveDate::from_ymd_opt(2024, 10, 1).unwrap());
    assert_eq!(early, "2024-02-09");
    assert!(early < late);
    assert_eq!(decode_date(&late).unwrap(), NaiveDate::from_ymd_opt(2024, 10, 1).unwrap());
  }

  #[test]
  fn unknown_enum_values_are_reported() {
    assert!(matches!(
      decode_subject_kind("group"),
      Err(Error::UnknownValue { column: "kind", .. })
    ));
    assert!(decode_action("3-TO-4").is_err());
    assert_eq!(decode_level("2").unwrap(), Level::Two);
  }
}
