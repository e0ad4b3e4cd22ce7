//! Built-in claim providers.
//!
//! Each provider reads one data source through the [`IdentityStore`] and
//! maps it onto OIDC claim names. Structured claims are assembled field by
//! field so their key order is fixed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value, json};

use super::{ClaimContext, ClaimFragment, ClaimProvider, ProviderError, SUB};
use crate::{
  authn::strongest,
  evidence::{EvidenceDetails, EvidenceRecord, IdDocument, ProofingMode, UtilityBill},
  profile::{Address, Affiliation, Profile},
  store::{EvidenceFilter, IdentityStore},
  trust::compute_trust_level,
};

/// `amr` values contributed when the subject holds a hardware authenticator.
pub const FIDO_AMR: [&str; 2] = ["pwd", "hwk"];

macro_rules! store_provider {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    pub struct $name<S> {
      store: Arc<S>,
    }

    impl<S> $name<S> {
      pub fn new(store: Arc<S>) -> Self { Self { store } }
    }
  };
}

store_provider!(
  /// `sub`: the subject's checksum identifier, if the subject exists.
  SubjectProvider
);
store_provider!(
  /// Name, birthdate, gender, email and phone claims from the profile.
  ProfileProvider
);
store_provider!(
  /// `address`: every stored address, in insertion order.
  AddressProvider
);
store_provider!(
  /// `document`: identifiers issued to the subject by other authorities.
  DocumentProvider
);
store_provider!(
  /// `organization_agent`: organizations the subject acts for.
  OrganizationProvider
);
store_provider!(
  /// `ial`, `aal` and `vot` from the trust level calculator.
  AssuranceProvider
);
store_provider!(
  /// `amr` when a hardware authenticator is registered.
  FidoProvider
);
store_provider!(
  /// `amr` from the strongest upstream identity provider assertion.
  UpstreamProvider
);

/// `verified_claims`: one entry per qualifying evidence record.
pub struct VerifiedClaimsProvider<S> {
  store:           Arc<S>,
  trust_framework: String,
}

impl<S> VerifiedClaimsProvider<S> {
  pub fn new(store: Arc<S>, trust_framework: String) -> Self {
    Self { store, trust_framework }
  }
}

// ─── Implementations ─────────────────────────────────────────────────────────

#[async_trait]
impl<S: IdentityStore + 'static> ClaimProvider for SubjectProvider<S> {
  fn name(&self) -> &'static str { "subject" }

  async fn provide(&self, ctx: &ClaimContext) -> Result<ClaimFragment, ProviderError> {
    let subject = self
      .store
      .get_subject(ctx.subject_id.clone())
      .await
      .map_err(ProviderError::store)?;
    Ok(ClaimFragment::new().with(SUB, subject.map(|s| json!(s.subject_id))))
  }
}

#[async_trait]
impl<S: IdentityStore + 'static> ClaimProvider for ProfileProvider<S> {
  fn name(&self) -> &'static str { "profile" }

  async fn provide(&self, ctx: &ClaimContext) -> Result<ClaimFragment, ProviderError> {
    let Some(stored) = self
      .store
      .get_profile(ctx.subject_id.clone())
      .await
      .map_err(ProviderError::store)?
    else {
      return Ok(ClaimFragment::new());
    };
    Ok(profile_claims(&stored.profile))
  }
}

fn profile_claims(p: &Profile) -> ClaimFragment {
  let string = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(Value::from);
  let email = string(&p.email);
  let email_verified = email.as_ref().map(|_| json!(p.email_verified));
  let phone = string(&p.phone_number);
  let phone_verified = phone.as_ref().map(|_| json!(p.phone_verified));

  ClaimFragment::new()
    .with("given_name", string(&p.given_name))
    .with("family_name", string(&p.family_name))
    .with("name", p.full_name().map(Value::from))
    .with("nickname", string(&p.nickname))
    .with("birthdate", p.birthdate.map(|d| json!(d)))
    .with("gender", string(&p.gender))
    .with("email", email)
    .with("email_verified", email_verified)
    .with("phone_number", phone)
    .with("phone_number_verified", phone_verified)
}

#[async_trait]
impl<S: IdentityStore + 'static> ClaimProvider for AddressProvider<S> {
  fn name(&self) -> &'static str { "address" }

  async fn provide(&self, ctx: &ClaimContext) -> Result<ClaimFragment, ProviderError> {
    let addresses = self
      .store
      .addresses(ctx.subject_id.clone())
      .await
      .map_err(ProviderError::store)?;
    let value = (!addresses.is_empty())
      .then(|| Value::Array(addresses.iter().map(address_claim).collect()));
    Ok(ClaimFragment::new().with("address", value))
  }
}

fn address_claim(a: &Address) -> Value {
  let mut out = Map::new();
  let formatted = a.formatted();
  if !formatted.is_empty() {
    out.insert("formatted".into(), formatted.into());
  }
  if let Some(street) = a.street_address() {
    out.insert("street_address".into(), street.into());
  }
  for (key, value) in [
    ("locality", &a.locality),
    ("region", &a.region),
    ("postal_code", &a.postal_code),
    ("country", &a.country),
  ] {
    if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
      out.insert(key.into(), v.into());
    }
  }
  Value::Object(out)
}

#[async_trait]
impl<S: IdentityStore + 'static> ClaimProvider for DocumentProvider<S> {
  fn name(&self) -> &'static str { "document" }

  async fn provide(&self, ctx: &ClaimContext) -> Result<ClaimFragment, ProviderError> {
    let documents = self
      .store
      .documents(ctx.subject_id.clone())
      .await
      .map_err(ProviderError::store)?;
    if documents.is_empty() {
      return Ok(ClaimFragment::new());
    }
    Ok(ClaimFragment::new().with("document", Some(serde_json::to_value(&documents)?)))
  }
}

#[async_trait]
impl<S: IdentityStore + 'static> ClaimProvider for OrganizationProvider<S> {
  fn name(&self) -> &'static str { "organization" }

  async fn provide(&self, ctx: &ClaimContext) -> Result<ClaimFragment, ProviderError> {
    let affiliations = self
      .store
      .affiliations(ctx.subject_id.clone())
      .await
      .map_err(ProviderError::store)?;
    if affiliations.is_empty() {
      return Ok(ClaimFragment::new());
    }
    let agents = affiliations.iter().map(organization_agent).collect();
    Ok(ClaimFragment::new().with("organization_agent", Some(Value::Array(agents))))
  }
}

fn organization_agent(a: &Affiliation) -> Value {
  let mut out = Map::new();
  out.insert("sub".into(), a.organization_id.as_str().into());
  out.insert("name".into(), a.name.as_str().into());
  for (key, value) in [("slug", &a.slug), ("role", &a.role)] {
    if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
      out.insert(key.into(), v.into());
    }
  }
  Value::Object(out)
}

#[async_trait]
impl<S: IdentityStore + 'static> ClaimProvider for AssuranceProvider<S> {
  fn name(&self) -> &'static str { "assurance" }

  async fn provide(&self, ctx: &ClaimContext) -> Result<ClaimFragment, ProviderError> {
    let level = compute_trust_level(self.store.as_ref(), &ctx.subject_id, ctx.today).await?;
    Ok(
      ClaimFragment::new()
        .with("ial", Some(json!(level.ial)))
        .with("aal", Some(json!(level.aal)))
        .with("vot", Some(json!(level.vot))),
    )
  }
}

#[async_trait]
impl<S: IdentityStore + 'static> ClaimProvider for FidoProvider<S> {
  fn name(&self) -> &'static str { "fido" }

  async fn provide(&self, ctx: &ClaimContext) -> Result<ClaimFragment, ProviderError> {
    let authenticators = self
      .store
      .authenticators(ctx.subject_id.clone())
      .await
      .map_err(ProviderError::store)?;
    let amr = (!authenticators.is_empty()).then(|| json!(FIDO_AMR));
    Ok(ClaimFragment::new().with("amr", amr))
  }
}

#[async_trait]
impl<S: IdentityStore + 'static> ClaimProvider for UpstreamProvider<S> {
  fn name(&self) -> &'static str { "upstream" }

  async fn provide(&self, ctx: &ClaimContext) -> Result<ClaimFragment, ProviderError> {
    let records = self
      .store
      .upstream_assurance(ctx.subject_id.clone())
      .await
      .map_err(ProviderError::store)?;
    let amr = strongest(&records)
      .filter(|r| !r.amr.is_empty())
      .map(|r| json!(r.amr));
    Ok(ClaimFragment::new().with("amr", amr))
  }
}

#[async_trait]
impl<S: IdentityStore + 'static> ClaimProvider for VerifiedClaimsProvider<S> {
  fn name(&self) -> &'static str { "verified_claims" }

  async fn provide(&self, ctx: &ClaimContext) -> Result<ClaimFragment, ProviderError> {
    let records = self
      .store
      .evidence_for(ctx.subject_id.clone(), EvidenceFilter::QualifyingOn(ctx.today))
      .await
      .map_err(ProviderError::store)?;
    if records.is_empty() {
      return Ok(ClaimFragment::new());
    }
    let profile = self
      .store
      .get_profile(ctx.subject_id.clone())
      .await
      .map_err(ProviderError::store)?
      .map(|p| p.profile)
      .unwrap_or_default();

    let verified = records
      .iter()
      .map(|r| verified_claim(r, &profile, &self.trust_framework))
      .collect();
    Ok(ClaimFragment::new().with("verified_claims", Some(Value::Array(verified))))
  }
}

fn verified_claim(record: &EvidenceRecord, profile: &Profile, trust_framework: &str) -> Value {
  let mut claims = Map::new();
  for (key, value) in [("given_name", &profile.given_name), ("family_name", &profile.family_name)] {
    if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
      claims.insert(key.into(), v.into());
    }
  }
  if let Some(v) = profile.birthdate {
    claims.insert("birthdate".into(), json!(v));
  }

  json!({
    "verification": {
      "trust_framework": trust_framework,
      "time": verification_time(record),
      "evidence": [evidence_entry(record)],
      "claims": claims,
    }
  })
}

/// The verification date at midnight UTC, or the last save.
fn verification_time(record: &EvidenceRecord) -> String {
  record
    .verified_on
    .map(date_time)
    .unwrap_or_else(|| record.updated_at.to_rfc3339())
}

/// The entry's `type` follows the structured details when present. The
/// configured evidence type is consulted only for records without details.
fn evidence_entry(record: &EvidenceRecord) -> Value {
  let mut entry = Map::new();
  let kind = match &record.details {
    EvidenceDetails::UtilityBill(_) => "utility_bill",
    EvidenceDetails::IdDocument(_) => "document",
    EvidenceDetails::None if record.evidence_type == "UTILITY_BILL" => "utility_bill",
    EvidenceDetails::None => "document",
  };
  entry.insert("type".into(), kind.into());
  if let Some(method) = proofing_method(record.proofing_mode) {
    entry.insert("method".into(), method.into());
  }
  if let Some(on) = record.verified_on {
    entry.insert("time".into(), date_time(on).into());
  }
  match &record.details {
    EvidenceDetails::IdDocument(doc) => {
      entry.insert("document_details".into(), document_details(doc));
    }
    EvidenceDetails::UtilityBill(bill) => {
      entry.insert("utility".into(), utility_details(bill));
      if let Some(date) = bill.date {
        entry.insert("date".into(), json!(date));
      }
    }
    EvidenceDetails::None => {}
  }
  Value::Object(entry)
}

/// OIDC Identity Assurance method names: physical and supervised remote
/// in-person proofing.
fn proofing_method(mode: ProofingMode) -> Option<&'static str> {
  match mode {
    ProofingMode::InPerson => Some("pipp"),
    ProofingMode::Remote => Some("sripp"),
    ProofingMode::Unspecified => None,
  }
}

fn date_time(date: NaiveDate) -> String {
  date
    .and_hms_opt(0, 0, 0)
    .map(|t| t.and_utc())
    .unwrap_or(DateTime::<Utc>::MIN_UTC)
    .to_rfc3339()
}

fn document_details(doc: &IdDocument) -> Value {
  let mut out = Map::new();
  out.insert("type".into(), doc.document_type.as_str().into());
  if let Some(n) = &doc.number {
    out.insert("document_number".into(), n.as_str().into());
  }
  let mut issuer = Map::new();
  for (key, value) in [
    ("name", &doc.issuer_name),
    ("country", &doc.issuer_country),
    ("region", &doc.issuer_region),
  ] {
    if let Some(v) = value {
      issuer.insert(key.into(), v.as_str().into());
    }
  }
  if !issuer.is_empty() {
    out.insert("issuer".into(), Value::Object(issuer));
  }
  if let Some(d) = doc.date_of_issuance {
    out.insert("date_of_issuance".into(), json!(d));
  }
  if let Some(d) = doc.date_of_expiry {
    out.insert("date_of_expiry".into(), json!(d));
  }
  Value::Object(out)
}

fn utility_details(bill: &UtilityBill) -> Value {
  let mut provider = Map::new();
  provider.insert("name".into(), bill.provider_name.as_str().into());
  for (key, value) in [
    ("street_address", &bill.street_address),
    ("locality", &bill.locality),
    ("region", &bill.region),
    ("postal_code", &bill.postal_code),
    ("country", &bill.country),
  ] {
    if let Some(v) = value {
      provider.insert(key.into(), v.as_str().into());
    }
  }
  json!({ "provider": provider })
}
