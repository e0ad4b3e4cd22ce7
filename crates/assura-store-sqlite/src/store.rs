//! [`SqliteStore`]: the SQLite implementation of [`IdentityStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;
use uuid::Uuid;

use assura_core::{
  authn::{Authenticator, NewAuthenticator, NewUpstreamAssurance, UpstreamAssurance},
  evidence::{EvidenceChange, EvidenceRecord, HistoryEntry, NewEvidence},
  profile::{Address, Affiliation, DocumentIdentifier, Profile, StoredProfile},
  store::{EvidenceFilter, IdentityStore},
  subject::{Subject, SubjectId, SubjectKind},
};

use crate::{
  Result,
  encode::{
    EncodedEvidence, RawAuthenticator, RawEvidence, RawHistory, RawProfile, RawSubject,
    RawUpstream, encode_date, encode_dt, encode_subject_kind, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Assura identity store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Append a JSON-encoded entry to one of the per-subject list tables.
  async fn append_json(
    &self,
    table: &'static str,
    subject_id: SubjectId,
    value: &impl Serialize,
  ) -> Result<()> {
    let value_json = serde_json::to_string(value)?;
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO {table} (subject_id, value_json, recorded_at) VALUES (?1, ?2, ?3)"
          ),
          rusqlite::params![subject_id.as_str(), value_json, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Read a per-subject list table in insertion order.
  async fn list_json<T: DeserializeOwned>(
    &self,
    table: &'static str,
    subject_id: SubjectId,
  ) -> Result<Vec<T>> {
    let raws: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT value_json FROM {table} WHERE subject_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![subject_id.as_str()], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .iter()
      .map(|s| serde_json::from_str(s).map_err(crate::Error::from))
      .collect()
  }
}

// ─── Connection-level helpers ────────────────────────────────────────────────
//
// These run on the database thread, usually inside a transaction.

fn load_history(conn: &Connection, record_id: &str) -> rusqlite::Result<Vec<RawHistory>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {} FROM evidence_history WHERE record_id = ?1 ORDER BY sequence",
    RawHistory::COLUMNS
  ))?;
  stmt
    .query_map(rusqlite::params![record_id], RawHistory::from_row)?
    .collect()
}

fn load_evidence(
  conn: &Connection,
  record_id: &str,
) -> rusqlite::Result<Option<(RawEvidence, Vec<RawHistory>)>> {
  let raw = conn
    .query_row(
      &format!("SELECT {} FROM evidence WHERE record_id = ?1", RawEvidence::COLUMNS),
      rusqlite::params![record_id],
      RawEvidence::from_row,
    )
    .optional()?;
  match raw {
    Some(raw) => {
      let history = load_history(conn, record_id)?;
      Ok(Some((raw, history)))
    }
    None => Ok(None),
  }
}

fn insert_evidence(conn: &Connection, e: &EncodedEvidence) -> rusqlite::Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO evidence ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, \
       ?13, ?14)",
      RawEvidence::COLUMNS
    ),
    rusqlite::params![
      e.record_id,
      e.subject_id,
      e.verifying_subject_id,
      e.action,
      e.classification,
      e.evidence_type,
      e.proofing_mode,
      e.details_json,
      e.description,
      e.note,
      e.expires_at,
      e.verified_on,
      e.created_at,
      e.updated_at,
    ],
  )?;
  Ok(())
}

fn update_evidence_row(conn: &Connection, e: &EncodedEvidence) -> rusqlite::Result<()> {
  conn.execute(
    "UPDATE evidence SET
       verifying_subject_id = ?2, action = ?3, classification = ?4,
       evidence_type = ?5, proofing_mode = ?6, details_json = ?7,
       description = ?8, note = ?9, expires_at = ?10, verified_on = ?11,
       updated_at = ?12
     WHERE record_id = ?1",
    rusqlite::params![
      e.record_id,
      e.verifying_subject_id,
      e.action,
      e.classification,
      e.evidence_type,
      e.proofing_mode,
      e.details_json,
      e.description,
      e.note,
      e.expires_at,
      e.verified_on,
      e.updated_at,
    ],
  )?;
  Ok(())
}

fn insert_history(conn: &Connection, record_id: &str, entry: &HistoryEntry) -> rusqlite::Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO evidence_history (record_id, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      RawHistory::COLUMNS
    ),
    rusqlite::params![
      record_id,
      entry.sequence,
      entry.subject_id.as_str(),
      entry.verifying_subject_id.as_ref().map(SubjectId::as_str),
      entry.action.as_str(),
      entry.description,
      encode_dt(entry.recorded_at),
    ],
  )?;
  Ok(())
}

fn set_verifying_agent(
  conn: &Connection,
  subject_id: &str,
  agent: &str,
  at: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO profiles (subject_id, verifying_agent, updated_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(subject_id) DO UPDATE SET verifying_agent = excluded.verifying_agent",
    rusqlite::params![subject_id, agent, at],
  )?;
  Ok(())
}

fn clear_verifying_agent(conn: &Connection, subject_id: &str) -> rusqlite::Result<()> {
  conn.execute(
    "UPDATE profiles SET verifying_agent = NULL WHERE subject_id = ?1",
    rusqlite::params![subject_id],
  )?;
  Ok(())
}

/// Load, change and write back one record. The caller owns the transaction.
fn apply_change(
  conn: &Connection,
  record_id: &str,
  change: EvidenceChange,
) -> Result<Option<EvidenceRecord>> {
  let Some((raw, history)) = load_evidence(conn, record_id)? else {
    return Ok(None);
  };
  let mut record = raw.into_record(history)?;
  record.apply(change, Utc::now())?;

  let encoded = EncodedEvidence::new(&record)?;
  update_evidence_row(conn, &encoded)?;
  if let Some(entry) = record.latest_entry() {
    insert_history(conn, record_id, entry)?;
  }
  if let Some(agent) = &encoded.verifying_subject_id {
    set_verifying_agent(conn, &encoded.subject_id, agent, &encoded.updated_at)?;
  }
  Ok(Some(record))
}

// ─── IdentityStore impl ──────────────────────────────────────────────────────

impl IdentityStore for SqliteStore {
  type Error = crate::Error;

  // ── Subjects ──────────────────────────────────────────────────────────────

  async fn subject_exists(&self, id: SubjectId) -> Result<bool> {
    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM subjects WHERE subject_id = ?1",
              rusqlite::params![id.as_str()],
              |_| Ok(()),
            )
            .optional()?
            .is_some(),
        )
      })
      .await?;
    Ok(exists)
  }

  async fn try_add_subject(&self, id: SubjectId, kind: SubjectKind) -> Result<Option<Subject>> {
    let subject = Subject { subject_id: id, kind, created_at: Utc::now() };

    let id_str = subject.subject_id.as_str().to_owned();
    let kind_str = encode_subject_kind(kind);
    let at_str = encode_dt(subject.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        match conn.execute(
          "INSERT INTO subjects (subject_id, kind, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, kind_str, at_str],
        ) {
          Ok(_) => Ok(true),
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
          {
            Ok(false)
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if !inserted {
      debug!(id = %subject.subject_id, "subject insert hit uniqueness constraint");
      return Ok(None);
    }
    Ok(Some(subject))
  }

  async fn get_subject(&self, id: SubjectId) -> Result<Option<Subject>> {
    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM subjects WHERE subject_id = ?1", RawSubject::COLUMNS),
              rusqlite::params![id.as_str()],
              RawSubject::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }

  async fn list_subjects(&self, kind: Option<SubjectKind>) -> Result<Vec<Subject>> {
    let kind_str = kind.map(encode_subject_kind);

    let raws: Vec<RawSubject> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM subjects WHERE ?1 IS NULL OR kind = ?1 ORDER BY created_at, rowid",
          RawSubject::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![kind_str], RawSubject::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubject::into_subject).collect()
  }

  // ── Profile data ──────────────────────────────────────────────────────────

  async fn put_profile(&self, subject_id: SubjectId, profile: Profile) -> Result<StoredProfile> {
    let at_str = encode_dt(Utc::now());
    let birthdate = profile.birthdate.map(encode_date);

    let raw: RawProfile = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO profiles (
             subject_id, given_name, family_name, nickname, birthdate, gender,
             email, email_verified, phone_number, phone_verified, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
           ON CONFLICT(subject_id) DO UPDATE SET
             given_name     = excluded.given_name,
             family_name    = excluded.family_name,
             nickname       = excluded.nickname,
             birthdate      = excluded.birthdate,
             gender         = excluded.gender,
             email          = excluded.email,
             email_verified = excluded.email_verified,
             phone_number   = excluded.phone_number,
             phone_verified = excluded.phone_verified,
             updated_at     = excluded.updated_at",
          rusqlite::params![
            subject_id.as_str(),
            profile.given_name,
            profile.family_name,
            profile.nickname,
            birthdate,
            profile.gender,
            profile.email,
            profile.email_verified,
            profile.phone_number,
            profile.phone_verified,
            at_str,
          ],
        )?;
        Ok(conn.query_row(
          &format!("SELECT {} FROM profiles WHERE subject_id = ?1", RawProfile::COLUMNS),
          rusqlite::params![subject_id.as_str()],
          RawProfile::from_row,
        )?)
      })
      .await?;

    raw.into_stored()
  }

  async fn get_profile(&self, subject_id: SubjectId) -> Result<Option<StoredProfile>> {
    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM profiles WHERE subject_id = ?1", RawProfile::COLUMNS),
              rusqlite::params![subject_id.as_str()],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProfile::into_stored).transpose()
  }

  async fn add_address(&self, subject_id: SubjectId, address: Address) -> Result<()> {
    self.append_json("addresses", subject_id, &address).await
  }

  async fn addresses(&self, subject_id: SubjectId) -> Result<Vec<Address>> {
    self.list_json("addresses", subject_id).await
  }

  async fn add_document(&self, subject_id: SubjectId, document: DocumentIdentifier) -> Result<()> {
    self.append_json("documents", subject_id, &document).await
  }

  async fn documents(&self, subject_id: SubjectId) -> Result<Vec<DocumentIdentifier>> {
    self.list_json("documents", subject_id).await
  }

  async fn add_affiliation(&self, subject_id: SubjectId, affiliation: Affiliation) -> Result<()> {
    self.append_json("affiliations", subject_id, &affiliation).await
  }

  async fn affiliations(&self, subject_id: SubjectId) -> Result<Vec<Affiliation>> {
    self.list_json("affiliations", subject_id).await
  }

  // ── Evidence ──────────────────────────────────────────────────────────────

  async fn record_evidence(&self, input: NewEvidence) -> Result<EvidenceRecord> {
    let record = EvidenceRecord::create(Uuid::new_v4(), input, Utc::now())?;
    let encoded = EncodedEvidence::new(&record)?;
    let history = record.history.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_evidence(&tx, &encoded)?;
        for entry in &history {
          insert_history(&tx, &encoded.record_id, entry)?;
        }
        if let Some(agent) = &encoded.verifying_subject_id {
          set_verifying_agent(&tx, &encoded.subject_id, agent, &encoded.updated_at)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn update_evidence(
    &self,
    record_id: Uuid,
    change: EvidenceChange,
  ) -> Result<Option<EvidenceRecord>> {
    let id_str = encode_uuid(record_id);

    // Domain rejections come back inside `Ok` so the transaction is rolled
    // back by dropping it rather than by a database error.
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = apply_change(&tx, &id_str, change);
        if matches!(outcome, Ok(Some(_))) {
          tx.commit()?;
        }
        Ok(outcome)
      })
      .await?
  }

  async fn delete_evidence(&self, record_id: Uuid) -> Result<Option<EvidenceRecord>> {
    let id_str = encode_uuid(record_id);

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some((raw, history)) = load_evidence(&tx, &id_str)? else {
          return Ok(None);
        };
        // History rows go with the record via ON DELETE CASCADE.
        tx.execute("DELETE FROM evidence WHERE record_id = ?1", rusqlite::params![id_str])?;
        clear_verifying_agent(&tx, &raw.subject_id)?;
        tx.commit()?;
        Ok(Some((raw, history)))
      })
      .await?;

    removed.map(|(raw, history)| raw.into_record(history)).transpose()
  }

  async fn get_evidence(&self, record_id: Uuid) -> Result<Option<EvidenceRecord>> {
    let id_str = encode_uuid(record_id);

    let found = self
      .conn
      .call(move |conn| Ok(load_evidence(conn, &id_str)?))
      .await?;

    found.map(|(raw, history)| raw.into_record(history)).transpose()
  }

  async fn evidence_for(
    &self,
    subject_id: SubjectId,
    filter: EvidenceFilter,
  ) -> Result<Vec<EvidenceRecord>> {
    let qualifying_on = match filter {
      EvidenceFilter::All => None,
      EvidenceFilter::QualifyingOn(today) => Some(encode_date(today)),
    };

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM evidence
           WHERE subject_id = ?1
             AND (?2 IS NULL
                  OR (classification <> '' AND (expires_at IS NULL OR expires_at >= ?2)))
           ORDER BY created_at, rowid",
          RawEvidence::COLUMNS
        ))?;
        let raws = stmt
          .query_map(
            rusqlite::params![subject_id.as_str(), qualifying_on],
            RawEvidence::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(raws.len());
        for raw in raws {
          let history = load_history(conn, &raw.record_id)?;
          rows.push((raw, history));
        }
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(raw, history)| raw.into_record(history))
      .collect()
  }

  // ── Authentication factors ────────────────────────────────────────────────

  async fn register_authenticator(&self, input: NewAuthenticator) -> Result<Authenticator> {
    let at_str = encode_dt(Utc::now());

    // Re-registering a known credential for the same subject keeps the
    // original row. A credential held by another subject is rejected.
    let raw: Result<RawAuthenticator> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
          "INSERT INTO authenticators (credential_id, subject_id, name, registered_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(credential_id) DO NOTHING",
          rusqlite::params![input.credential_id, input.subject_id.as_str(), input.name, at_str],
        )?;
        let row = tx
          .query_row(
            &format!(
              "SELECT {} FROM authenticators WHERE credential_id = ?1 AND subject_id = ?2",
              RawAuthenticator::COLUMNS
            ),
            rusqlite::params![input.credential_id, input.subject_id.as_str()],
            RawAuthenticator::from_row,
          )
          .optional()?;
        tx.commit()?;
        Ok(row.ok_or_else(|| {
          crate::Error::Core(assura_core::Error::CredentialInUse {
            credential_id: input.credential_id,
          })
        }))
      })
      .await?;

    raw?.into_authenticator()
  }

  async fn remove_authenticator(&self, credential_id: String) -> Result<bool> {
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM authenticators WHERE credential_id = ?1",
          rusqlite::params![credential_id],
        )?)
      })
      .await?;
    Ok(removed > 0)
  }

  async fn authenticators(&self, subject_id: SubjectId) -> Result<Vec<Authenticator>> {
    let raws: Vec<RawAuthenticator> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM authenticators WHERE subject_id = ?1 ORDER BY registered_at, rowid",
          RawAuthenticator::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![subject_id.as_str()], RawAuthenticator::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAuthenticator::into_authenticator).collect()
  }

  async fn put_upstream_assurance(&self, input: NewUpstreamAssurance) -> Result<UpstreamAssurance> {
    let record = UpstreamAssurance {
      subject_id:  input.subject_id,
      provider:    input.provider,
      aal:         input.aal,
      amr:         input.amr,
      asserted_at: Utc::now(),
    };

    let subject_str = record.subject_id.as_str().to_owned();
    let provider = record.provider.clone();
    let aal_str = record.aal.as_str();
    let amr_json = serde_json::to_string(&record.amr)?;
    let at_str = encode_dt(record.asserted_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO upstream_assurance (subject_id, provider, aal, amr_json, asserted_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(subject_id, provider) DO UPDATE SET
             aal         = excluded.aal,
             amr_json    = excluded.amr_json,
             asserted_at = excluded.asserted_at",
          rusqlite::params![subject_str, provider, aal_str, amr_json, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn upstream_assurance(&self, subject_id: SubjectId) -> Result<Vec<UpstreamAssurance>> {
    let raws: Vec<RawUpstream> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM upstream_assurance WHERE subject_id = ?1 ORDER BY provider",
          RawUpstream::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![subject_id.as_str()], RawUpstream::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawUpstream::into_upstream).collect()
  }
}
