//! Integration tests for `SqliteStore` against an in-memory database.

use std::{sync::Arc, time::Duration};

use assura_core::{
  Error as CoreError,
  authn::{NewAuthenticator, NewUpstreamAssurance},
  claims::{ClaimContext, ClaimFragment, ClaimProvider, ClaimRegistry, ClaimsConfig, ProviderError},
  evidence::{EvidenceAction, EvidenceChange, EvidencePolicy, NewEvidence},
  identifier::{self, IdentifierConfig, IdentifierGenerator},
  ledger,
  profile::{Address, Affiliation, DocumentIdentifier, Profile},
  store::{EvidenceFilter, IdentityStore},
  subject::{SubjectId, SubjectKind},
  trust::{Level, compute_trust_level},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn generator() -> IdentifierGenerator {
  IdentifierGenerator::new(&IdentifierConfig::default()).unwrap()
}

async fn person(s: &SqliteStore) -> SubjectId {
  identifier::create_subject(s, &generator(), SubjectKind::Person, "")
    .await
    .unwrap()
    .subject_id
}

fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 3, 15).unwrap() }

fn upgrade(subject: &SubjectId, verifier: &SubjectId) -> NewEvidence {
  let mut input = NewEvidence::new(subject.clone(), EvidenceAction::Upgrade);
  input.verifying_subject_id = Some(verifier.clone());
  input.classification = "ONE-SUPERIOR-OR-STRONG-PLUS".into();
  input.evidence_type = "ID_DOCUMENT".into();
  input.description = Some("inspected a driving permit".into());
  input
}

// ─── Subjects ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_subject() {
  let s = store().await;
  let subject = identifier::create_subject(&s, &generator(), SubjectKind::Person, "4242")
    .await
    .unwrap();
  assert!(subject.subject_id.as_str().starts_with("14242"));
  assert!(generator().validate(&subject.subject_id));

  let fetched = s.get_subject(subject.subject_id.clone()).await.unwrap().unwrap();
  assert_eq!(fetched.subject_id, subject.subject_id);
  assert_eq!(fetched.kind, SubjectKind::Person);
  assert!(s.subject_exists(subject.subject_id).await.unwrap());
  assert!(!s.subject_exists("000000000000000".into()).await.unwrap());
}

#[tokio::test]
async fn organizations_use_their_own_leading_digit() {
  let s = store().await;
  let config = IdentifierConfig { prefix: "857".into(), ..Default::default() };
  let generator = IdentifierGenerator::new(&config).unwrap();

  let org = identifier::create_subject(&s, &generator, SubjectKind::Organization, "")
    .await
    .unwrap();
  assert!(org.subject_id.as_str().starts_with('2'));
  assert!(identifier::luhn_valid(&format!("857{}", org.subject_id)));

  let orgs = s.list_subjects(Some(SubjectKind::Organization)).await.unwrap();
  assert_eq!(orgs.len(), 1);
  assert!(s.list_subjects(Some(SubjectKind::Person)).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_identifier_is_reported_as_collision() {
  let s = store().await;
  let id = generator().generate(SubjectKind::Person, "");
  assert!(s.try_add_subject(id.clone(), SubjectKind::Person).await.unwrap().is_some());
  assert!(s.try_add_subject(id, SubjectKind::Organization).await.unwrap().is_none());
  assert_eq!(s.list_subjects(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn allocation_gives_up_on_a_saturated_namespace() {
  let s = store().await;
  let taken = person(&s).await;

  // Every candidate collides at insert time.
  let err = identifier::allocate(
    3,
    || taken.clone(),
    |id| {
      let s = &s;
      async move { s.try_add_subject(id, SubjectKind::Person).await.map_err(CoreError::from) }
    },
  )
  .await
  .unwrap_err();
  assert!(matches!(err, CoreError::IdentifierCollisionExhausted { attempts: 3 }));
  assert!(err.is_retryable());
}

// ─── Evidence ledger ─────────────────────────────────────────────────────────

#[tokio::test]
async fn upgrade_then_downgrade_round_trip() {
  let s = store().await;
  let policy = EvidencePolicy::default();
  let subject = person(&s).await;
  let verifier = person(&s).await;

  let level = compute_trust_level(&s, &subject, today()).await.unwrap();
  assert_eq!((level.ial, level.aal), (Level::One, Level::One));
  assert_eq!(level.vot.to_string(), "P1.C1");

  let record = ledger::record_evidence(&s, &policy, upgrade(&subject, &verifier))
    .await
    .unwrap();
  let level = compute_trust_level(&s, &subject, today()).await.unwrap();
  assert_eq!(level.ial, Level::Two);
  assert_eq!(level.vot.to_string(), "P2.C1");

  let mut change = EvidenceChange::new(EvidenceAction::Downgrade);
  change.verifying_subject_id = Some(verifier.clone());
  change.description = Some("document revoked".into());
  let downgraded = ledger::update_evidence(&s, &policy, record.record_id, change)
    .await
    .unwrap();
  assert_eq!(downgraded.classification, "");
  assert_eq!(downgraded.history.len(), 2);

  let level = compute_trust_level(&s, &subject, today()).await.unwrap();
  assert_eq!(level.ial, Level::One);
  assert_eq!(level.vot.to_string(), "P1.C1");

  let stored = ledger::get_evidence(&s, record.record_id).await.unwrap();
  assert_eq!(stored, downgraded);
  let actions: Vec<_> = stored.history.iter().map(|h| h.action).collect();
  assert_eq!(actions, [EvidenceAction::Upgrade, EvidenceAction::Downgrade]);
  assert_eq!(stored.history[0].subject_id, subject);
  assert_eq!(stored.history[1].description.as_deref(), Some("document revoked"));
}

#[tokio::test]
async fn expired_evidence_is_filtered_at_the_data_layer() {
  let s = store().await;
  let subject = person(&s).await;
  let verifier = person(&s).await;

  let mut input = upgrade(&subject, &verifier);
  input.expires_at = today().pred_opt();
  ledger::record_evidence(&s, &EvidencePolicy::default(), input).await.unwrap();

  let qualifying = s
    .evidence_for(subject.clone(), EvidenceFilter::QualifyingOn(today()))
    .await
    .unwrap();
  assert!(qualifying.is_empty());
  assert_eq!(ledger::evidence_for(&s, &subject).await.unwrap().len(), 1);

  let level = compute_trust_level(&s, &subject, today()).await.unwrap();
  assert_eq!(level.ial, Level::One);

  // Expiring today still counts.
  let level = compute_trust_level(&s, &subject, today().pred_opt().unwrap())
    .await
    .unwrap();
  assert_eq!(level.ial, Level::Two);
}

#[tokio::test]
async fn rejected_update_leaves_history_untouched() {
  let s = store().await;
  let policy = EvidencePolicy::default();
  let subject = person(&s).await;
  let verifier = person(&s).await;

  let record = ledger::record_evidence(&s, &policy, upgrade(&subject, &verifier))
    .await
    .unwrap();

  let mut change = EvidenceChange::new(EvidenceAction::Upgrade);
  change.verifying_subject_id = Some(subject.clone());
  let err = ledger::update_evidence(&s, &policy, record.record_id, change)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::SelfVerification(_)));

  let mut change = EvidenceChange::new(EvidenceAction::Update);
  change.classification = Some("GOLD-STAR".into());
  let err = ledger::update_evidence(&s, &policy, record.record_id, change)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidEvidenceClassification { .. }));

  let stored = ledger::get_evidence(&s, record.record_id).await.unwrap();
  assert_eq!(stored.history.len(), 1);
  assert_eq!(stored.classification, "ONE-SUPERIOR-OR-STRONG-PLUS");
}

#[tokio::test]
async fn ledger_rejects_unknown_subjects_and_records() {
  let s = store().await;
  let policy = EvidencePolicy::default();
  let subject = person(&s).await;

  let ghost: SubjectId = "199999999999999".into();
  let err = ledger::record_evidence(&s, &policy, upgrade(&subject, &ghost))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::SubjectNotFound(id) if id == ghost));

  let missing = Uuid::new_v4();
  let err = ledger::update_evidence(&s, &policy, missing, EvidenceChange::default())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::EvidenceNotFound(id) if id == missing));
  assert!(ledger::delete_evidence(&s, missing).await.is_err());
}

#[tokio::test]
async fn verifying_agent_follows_evidence() {
  let s = store().await;
  let policy = EvidencePolicy::default();
  let subject = person(&s).await;
  let verifier = person(&s).await;

  let profile = Profile { given_name: Some("Ada".into()), ..Default::default() };
  s.put_profile(subject.clone(), profile.clone()).await.unwrap();

  let record = ledger::record_evidence(&s, &policy, upgrade(&subject, &verifier))
    .await
    .unwrap();
  let stored = s.get_profile(subject.clone()).await.unwrap().unwrap();
  assert_eq!(stored.verifying_agent.as_ref(), Some(&verifier));

  // Editing the profile keeps the annotation.
  let stored = s.put_profile(subject.clone(), profile).await.unwrap();
  assert_eq!(stored.verifying_agent.as_ref(), Some(&verifier));

  let removed = ledger::delete_evidence(&s, record.record_id).await.unwrap();
  assert_eq!(removed.record_id, record.record_id);
  let stored = s.get_profile(subject.clone()).await.unwrap().unwrap();
  assert_eq!(stored.verifying_agent, None);
  assert!(s.get_evidence(record.record_id).await.unwrap().is_none());

  let level = compute_trust_level(&s, &subject, today()).await.unwrap();
  assert_eq!(level.ial, Level::One);
}

#[tokio::test]
async fn verifier_without_profile_creates_annotation_row() {
  let s = store().await;
  let subject = person(&s).await;
  let verifier = person(&s).await;

  ledger::record_evidence(&s, &EvidencePolicy::default(), upgrade(&subject, &verifier))
    .await
    .unwrap();
  let stored = s.get_profile(subject).await.unwrap().unwrap();
  assert_eq!(stored.profile, Profile::default());
  assert_eq!(stored.verifying_agent, Some(verifier));
}

// ─── Profile lists ───────────────────────────────────────────────────────────

#[tokio::test]
async fn lists_keep_insertion_order() {
  let s = store().await;
  let subject = person(&s).await;

  for city in ["Albany", "Buffalo", "Albany"] {
    let address = Address { locality: Some(city.into()), ..Default::default() };
    s.add_address(subject.clone(), address).await.unwrap();
  }
  let cities: Vec<_> = s
    .addresses(subject.clone())
    .await
    .unwrap()
    .into_iter()
    .filter_map(|a| a.locality)
    .collect();
  assert_eq!(cities, ["Albany", "Buffalo", "Albany"]);

  let document = DocumentIdentifier {
    kind:        "member_id".into(),
    number:      "M-1".into(),
    issuer:      Some("Example Health".into()),
    country:     None,
    subdivision: None,
    uri:         None,
  };
  s.add_document(subject.clone(), document.clone()).await.unwrap();
  assert_eq!(s.documents(subject.clone()).await.unwrap(), [document]);
  assert!(s.affiliations(subject).await.unwrap().is_empty());
}

// ─── Authentication factors ──────────────────────────────────────────────────

#[tokio::test]
async fn credential_held_by_another_subject_is_rejected() {
  let s = store().await;
  let a = person(&s).await;
  let b = person(&s).await;

  let key = |subject: &SubjectId, name: &str| NewAuthenticator {
    credential_id: "cred-x".into(),
    subject_id:    subject.clone(),
    name:          name.into(),
  };
  let registered = s.register_authenticator(key(&a, "A key")).await.unwrap();
  assert_eq!(registered.subject_id, a);

  let err = s.register_authenticator(key(&b, "B key")).await.unwrap_err();
  assert!(matches!(
    CoreError::from(err),
    CoreError::CredentialInUse { credential_id } if credential_id == "cred-x"
  ));
  assert!(s.authenticators(b).await.unwrap().is_empty());
  assert_eq!(s.authenticators(a).await.unwrap(), [registered]);
}

#[tokio::test]
async fn authenticators_and_upstream_drive_aal() {
  let s = store().await;
  let subject = person(&s).await;

  let key = NewAuthenticator {
    credential_id: "cred-1".into(),
    subject_id:    subject.clone(),
    name:          "YubiKey".into(),
  };
  let registered = s.register_authenticator(key.clone()).await.unwrap();
  // Re-registration is idempotent.
  assert_eq!(s.register_authenticator(key).await.unwrap(), registered);
  assert_eq!(s.authenticators(subject.clone()).await.unwrap().len(), 1);

  let level = compute_trust_level(&s, &subject, today()).await.unwrap();
  assert_eq!(level.vot.to_string(), "P1.C2");

  assert!(s.remove_authenticator("cred-1".into()).await.unwrap());
  assert!(!s.remove_authenticator("cred-1".into()).await.unwrap());
  let level = compute_trust_level(&s, &subject, today()).await.unwrap();
  assert_eq!(level.aal, Level::One);

  let assertion = |aal| NewUpstreamAssurance {
    subject_id: subject.clone(),
    provider: "okta".into(),
    aal,
    amr: vec!["pwd".into(), "otp".into()],
  };
  s.put_upstream_assurance(assertion(Level::Two)).await.unwrap();
  assert_eq!(compute_trust_level(&s, &subject, today()).await.unwrap().aal, Level::Two);

  // Upsert replaces the record for the same provider.
  s.put_upstream_assurance(assertion(Level::One)).await.unwrap();
  let records = s.upstream_assurance(subject.clone()).await.unwrap();
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].aal, Level::One);
  assert_eq!(compute_trust_level(&s, &subject, today()).await.unwrap().aal, Level::One);
}

// ─── Claims aggregation ──────────────────────────────────────────────────────

struct Broken;

#[async_trait]
impl ClaimProvider for Broken {
  fn name(&self) -> &'static str { "broken" }

  async fn provide(&self, _: &ClaimContext) -> Result<ClaimFragment, ProviderError> {
    Err(ProviderError::TimedOut(Duration::ZERO))
  }
}

#[tokio::test]
async fn aggregates_claims_from_configured_providers() {
  let s = Arc::new(store().await);
  let policy = EvidencePolicy::default();
  let subject = person(&s).await;
  let verifier = person(&s).await;

  let profile = Profile {
    given_name: Some("Ada".into()),
    family_name: Some("Lovelace".into()),
    email: Some("ada@example.com".into()),
    email_verified: true,
    ..Default::default()
  };
  s.put_profile(subject.clone(), profile).await.unwrap();
  s.add_address(subject.clone(), Address {
    locality: Some("London".into()),
    country: Some("GB".into()),
    ..Default::default()
  })
  .await
  .unwrap();
  let org = identifier::create_subject(s.as_ref(), &generator(), SubjectKind::Organization, "")
    .await
    .unwrap();
  s.add_affiliation(subject.clone(), Affiliation {
    organization_id: org.subject_id.clone(),
    name:            "Analytical Engines Ltd".into(),
    slug:            Some("aeltd".into()),
    role:            Some("agent".into()),
  })
  .await
  .unwrap();
  ledger::record_evidence(s.as_ref(), &policy, upgrade(&subject, &verifier))
    .await
    .unwrap();
  s.register_authenticator(NewAuthenticator {
    credential_id: "cred-1".into(),
    subject_id:    subject.clone(),
    name:          String::new(),
  })
  .await
  .unwrap();
  s.put_upstream_assurance(NewUpstreamAssurance {
    subject_id: subject.clone(),
    provider:   "okta".into(),
    aal:        Level::Two,
    amr:        vec!["pwd".into(), "otp".into()],
  })
  .await
  .unwrap();

  let registry = ClaimRegistry::from_config(&ClaimsConfig::default(), s.clone());
  let claims = registry.aggregate(&subject, today()).await.unwrap();

  assert_eq!(claims.subject(), Some(subject.as_str()));
  assert_eq!(claims.get("given_name"), Some(&json!("Ada")));
  assert_eq!(claims.get("name"), Some(&json!("Ada Lovelace")));
  assert_eq!(claims.get("email_verified"), Some(&json!(true)));
  assert_eq!(claims.get("ial"), Some(&json!("2")));
  assert_eq!(claims.get("aal"), Some(&json!("2")));
  assert_eq!(claims.get("vot"), Some(&json!("P2.C2")));
  // The upstream provider runs after fido and supersedes its amr.
  assert_eq!(claims.get("amr"), Some(&json!(["pwd", "otp"])));
  assert_eq!(
    claims.get("address"),
    Some(&json!([{ "formatted": "London, GB", "locality": "London", "country": "GB" }]))
  );
  assert_eq!(
    claims.get("organization_agent"),
    Some(&json!([{
      "sub": org.subject_id,
      "name": "Analytical Engines Ltd",
      "slug": "aeltd",
      "role": "agent",
    }]))
  );
  let verified = &claims.get("verified_claims").unwrap()[0]["verification"];
  assert_eq!(verified["trust_framework"], json!("nist_800_63A"));
  assert_eq!(verified["claims"]["family_name"], json!("Lovelace"));

  let again = registry.aggregate(&subject, today()).await.unwrap();
  assert_eq!(claims.to_json_bytes().unwrap(), again.to_json_bytes().unwrap());
}

#[tokio::test]
async fn broken_provider_does_not_hide_other_claims() {
  let s = Arc::new(store().await);
  let subject = person(&s).await;

  let registry = ClaimRegistry::from_config(&ClaimsConfig::default(), s.clone())
    .with_provider(Broken);

  let claims = registry.aggregate(&subject, today()).await.unwrap();
  assert_eq!(claims.subject(), Some(subject.as_str()));
  assert_eq!(claims.get("vot"), Some(&json!("P1.C1")));
  assert_eq!(claims.get("given_name"), None);
}

#[tokio::test]
async fn unknown_subject_is_missing_mandatory_claim() {
  let s = Arc::new(store().await);
  let registry = ClaimRegistry::from_config(&ClaimsConfig::default(), s);
  let ghost: SubjectId = "199999999999999".into();
  let err = registry.aggregate(&ghost, today()).await.unwrap_err();
  assert!(matches!(err, CoreError::MissingMandatoryClaim(_)));
}
