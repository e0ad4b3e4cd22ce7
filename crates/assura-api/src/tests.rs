//! Router tests against an in-memory SQLite store.

use std::{sync::Arc, time::Duration};

use assura_core::{
  claims::{ClaimRegistry, ClaimsConfig, ProviderKind},
  evidence::EvidencePolicy,
  identifier::{IdentifierConfig, IdentifierGenerator},
};
use assura_store_sqlite::SqliteStore;
use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::{ApiState, api_router};

async fn make_state() -> ApiState<SqliteStore> {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let registry = ClaimRegistry::from_config(&ClaimsConfig::default(), store.clone());
  ApiState {
    store,
    generator: Arc::new(IdentifierGenerator::new(&IdentifierConfig::default()).unwrap()),
    policy: Arc::new(EvidencePolicy::default()),
    registry: Arc::new(registry),
  }
}

async fn send(
  state:  &ApiState<SqliteStore>,
  method: &str,
  uri:    &str,
  body:   Option<Value>,
) -> Response {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  api_router(state.clone())
    .oneshot(builder.body(body).unwrap())
    .await
    .unwrap()
}

async fn json_body(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

async fn create(state: &ApiState<SqliteStore>, kind: &str) -> String {
  let resp = send(state, "POST", "/subjects", Some(json!({ "kind": kind }))).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  json_body(resp).await["subject_id"].as_str().unwrap().to_owned()
}

fn upgrade(subject: &str, verifier: &str) -> Value {
  json!({
    "subject_id": subject,
    "verifying_subject_id": verifier,
    "action": "1-TO-2",
    "classification": "TWO-STRONG",
    "evidence_type": "ID_DOCUMENT",
    "proofing_mode": "in_person",
    "details": { "kind": "id_document", "document_type": "driving_permit" },
    "verified_on": "2024-03-01",
  })
}

// ── Subjects ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_list_and_fetch_subjects() {
  let state = make_state().await;
  let resp = send(
    &state,
    "POST",
    "/subjects",
    Some(json!({ "kind": "person", "chosen_digits": "77" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let person = json_body(resp).await;
  let id = person["subject_id"].as_str().unwrap().to_owned();
  assert!(id.starts_with("177"), "unexpected id {id}");
  assert_eq!(id.len(), 15);

  create(&state, "organization").await;

  let all = json_body(send(&state, "GET", "/subjects", None).await).await;
  assert_eq!(all.as_array().unwrap().len(), 2);
  let orgs = json_body(send(&state, "GET", "/subjects?kind=organization", None).await).await;
  assert_eq!(orgs.as_array().unwrap().len(), 1);

  let resp = send(&state, "GET", &format!("/subjects/{id}"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["kind"], "person");
}

#[tokio::test]
async fn unknown_subject_is_404_with_error_body() {
  let state = make_state().await;
  let resp = send(&state, "GET", "/subjects/100000000000008", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  assert!(json_body(resp).await["error"].as_str().unwrap().contains("100000000000008"));

  let resp = send(&state, "GET", "/subjects/100000000000008/claims", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ── Profile data ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn profile_round_trip() {
  let state = make_state().await;
  let id = create(&state, "person").await;

  let resp = send(&state, "GET", &format!("/subjects/{id}/profile"), None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);

  let resp = send(
    &state,
    "PUT",
    &format!("/subjects/{id}/profile"),
    Some(json!({ "given_name": "Ada", "family_name": "Lovelace", "email": "ada@example.org" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);

  let profile = json_body(send(&state, "GET", &format!("/subjects/{id}/profile"), None).await).await;
  assert_eq!(profile["given_name"], "Ada");
  assert_eq!(profile["email_verified"], false);
}

#[tokio::test]
async fn affiliation_requires_an_organization() {
  let state = make_state().await;
  let person = create(&state, "person").await;
  let other = create(&state, "person").await;
  let org = create(&state, "organization").await;

  let resp = send(
    &state,
    "POST",
    &format!("/subjects/{person}/affiliations"),
    Some(json!({ "organization_id": other, "name": "Not an org" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let resp = send(
    &state,
    "POST",
    &format!("/subjects/{person}/affiliations"),
    Some(json!({ "organization_id": org, "name": "Acme", "role": "member" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
}

// ── Evidence ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn evidence_lifecycle_moves_the_trust_level() {
  let state = make_state().await;
  let subject = create(&state, "person").await;
  let verifier = create(&state, "person").await;

  let level = json_body(send(&state, "GET", &format!("/subjects/{subject}/trust-level"), None).await).await;
  assert_eq!(level["vot"], "P1.C1");

  let resp = send(&state, "POST", "/evidence", Some(upgrade(&subject, &verifier))).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let record = json_body(resp).await;
  let record_id = record["record_id"].as_str().unwrap().to_owned();
  assert_eq!(record["history"].as_array().unwrap().len(), 1);

  let level = json_body(send(&state, "GET", &format!("/subjects/{subject}/trust-level"), None).await).await;
  assert_eq!(level["ial"], "2");
  assert_eq!(level["vot"], "P2.C1");

  let resp = send(
    &state,
    "PATCH",
    &format!("/evidence/{record_id}"),
    Some(json!({ "verifying_subject_id": verifier, "action": "2-TO-1", "description": "revoked" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["history"].as_array().unwrap().len(), 2);

  let level = json_body(send(&state, "GET", &format!("/subjects/{subject}/trust-level"), None).await).await;
  assert_eq!(level["vot"], "P1.C1");

  let listed = json_body(send(&state, "GET", &format!("/evidence?subject_id={subject}"), None).await).await;
  assert_eq!(listed.as_array().unwrap().len(), 1);

  let resp = send(&state, "DELETE", &format!("/evidence/{record_id}"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let resp = send(&state, "GET", &format!("/evidence/{record_id}"), None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn evidence_validation_statuses() {
  let state = make_state().await;
  let subject = create(&state, "person").await;
  let verifier = create(&state, "person").await;

  let mut bad = upgrade(&subject, &verifier);
  bad["classification"] = json!("GOLD-STAR");
  let resp = send(&state, "POST", "/evidence", Some(bad)).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert!(json_body(resp).await["error"].as_str().unwrap().contains("classification"));

  let mut empty = upgrade(&subject, &verifier);
  empty["classification"] = json!("");
  let resp = send(&state, "POST", "/evidence", Some(empty)).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let resp = send(&state, "POST", "/evidence", Some(upgrade(&subject, &subject))).await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);

  let resp = send(&state, "POST", "/evidence", Some(upgrade(&subject, "100000000000008"))).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);

  let listed = json_body(send(&state, "GET", &format!("/evidence?subject_id={subject}"), None).await).await;
  assert!(listed.as_array().unwrap().is_empty());
}

// ── Authentication factors ───────────────────────────────────────────────────

#[tokio::test]
async fn authenticators_and_upstream_raise_the_aal() {
  let state = make_state().await;
  let id = create(&state, "person").await;

  let resp = send(
    &state,
    "POST",
    &format!("/subjects/{id}/authenticators"),
    Some(json!({ "credential_id": "cred-1", "name": "YubiKey" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let level = json_body(send(&state, "GET", &format!("/subjects/{id}/trust-level"), None).await).await;
  assert_eq!(level["aal"], "2");

  let resp = send(&state, "DELETE", "/authenticators/cred-1", None).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);
  let resp = send(&state, "DELETE", "/authenticators/cred-1", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);

  let resp = send(
    &state,
    "PUT",
    &format!("/subjects/{id}/upstream-assurance"),
    Some(json!({ "provider": "login.example", "aal": "3", "amr": ["pwd", "otp"] })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let level = json_body(send(&state, "GET", &format!("/subjects/{id}/trust-level"), None).await).await;
  assert_eq!(level["aal"], "3");
}

#[tokio::test]
async fn credential_of_another_subject_is_a_conflict() {
  let state = make_state().await;
  let a = create(&state, "person").await;
  let b = create(&state, "person").await;
  let body = json!({ "credential_id": "cred-x", "name": "A key" });

  let resp = send(&state, "POST", &format!("/subjects/{a}/authenticators"), Some(body.clone())).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  assert_eq!(json_body(resp).await["subject_id"], a.as_str());

  let resp = send(&state, "POST", &format!("/subjects/{b}/authenticators"), Some(body)).await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
  assert!(json_body(resp).await["error"].as_str().unwrap().contains("cred-x"));

  let level = json_body(send(&state, "GET", &format!("/subjects/{b}/trust-level"), None).await).await;
  assert_eq!(level["aal"], "1");
}

// ── Claims ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn claims_carry_a_stable_etag() {
  let state = make_state().await;
  let id = create(&state, "person").await;
  send(
    &state,
    "PUT",
    &format!("/subjects/{id}/profile"),
    Some(json!({ "given_name": "Ada", "family_name": "Lovelace" })),
  )
  .await;

  let first = send(&state, "GET", &format!("/subjects/{id}/claims"), None).await;
  assert_eq!(first.status(), StatusCode::OK);
  let etag = first.headers().get(header::ETAG).unwrap().to_str().unwrap().to_owned();
  let claims = json_body(first).await;
  assert_eq!(claims["sub"], id.as_str());
  assert_eq!(claims["name"], "Ada Lovelace");
  assert_eq!(claims["vot"], "P1.C1");

  let second = send(&state, "GET", &format!("/subjects/{id}/claims"), None).await;
  assert_eq!(second.headers().get(header::ETAG).unwrap().to_str().unwrap(), etag);
}

#[tokio::test]
async fn registry_serves_only_configured_providers() {
  let mut state = make_state().await;
  let config = ClaimsConfig {
    providers: vec![ProviderKind::Subject, ProviderKind::Assurance],
    provider_timeout_ms: 1_000,
    ..Default::default()
  };
  assert_eq!(config.provider_timeout(), Duration::from_secs(1));
  state.registry = Arc::new(ClaimRegistry::from_config(&config, state.store.clone()));

  let id = create(&state, "person").await;
  send(
    &state,
    "PUT",
    &format!("/subjects/{id}/profile"),
    Some(json!({ "given_name": "Ada" })),
  )
  .await;

  let claims = json_body(send(&state, "GET", &format!("/subjects/{id}/claims"), None).await).await;
  let keys: Vec<&str> = claims.as_object().unwrap().keys().map(String::as_str).collect();
  assert_eq!(keys, ["sub", "ial", "aal", "vot"]);
}
