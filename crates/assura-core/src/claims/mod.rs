//! Claims aggregation.
//!
//! A [`ClaimProvider`] contributes a [`ClaimFragment`] about one subject. The
//! [`ClaimRegistry`] runs its providers concurrently, then merges their
//! fragments in configured order into a single [`ClaimSet`]. Later providers
//! overwrite claims of the same name set by earlier ones.
//!
//! Provider failures never reach the caller. They are logged and the provider
//! contributes nothing.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{BoxError, subject::SubjectId};

pub mod providers;
pub mod registry;

pub use self::registry::{ClaimRegistry, ClaimsConfig, ProviderKind};

/// The mandatory claim. Its absence from an aggregated set is a hard error.
pub const SUB: &str = "sub";

// ─── Provider interface ──────────────────────────────────────────────────────

/// What a provider is asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimContext {
  pub subject_id: SubjectId,
  /// Reference date for expiry checks, fixed for the whole aggregation.
  pub today:      NaiveDate,
}

/// Why a provider contributed nothing. Produced at the aggregator boundary
/// and logged; never returned from [`ClaimRegistry::aggregate`].
#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("timed out after {0:?}")]
  TimedOut(Duration),

  #[error("panicked: {0}")]
  Panicked(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl ProviderError {
  pub fn store<E>(error: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(error))
  }
}

impl From<crate::Error> for ProviderError {
  fn from(error: crate::Error) -> Self { Self::Store(Box::new(error)) }
}

/// A source of claims about a subject.
///
/// Returning an empty fragment means "no opinion". Errors are reserved for
/// real failures; the registry logs them with the provider's name.
#[async_trait]
pub trait ClaimProvider: Send + Sync {
  /// Stable name used in logs.
  fn name(&self) -> &'static str;

  async fn provide(&self, ctx: &ClaimContext) -> Result<ClaimFragment, ProviderError>;
}

// ─── Fragment ────────────────────────────────────────────────────────────────

/// The claims one provider contributes, in the order it produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimFragment {
  claims: Vec<(&'static str, Value)>,
}

impl ClaimFragment {
  pub fn new() -> Self { Self::default() }

  /// Add `name` if `value` is present. `None` is "no opinion" and adds
  /// nothing.
  pub fn with(mut self, name: &'static str, value: Option<Value>) -> Self {
    if let Some(value) = value {
      self.insert(name, value);
    }
    self
  }

  pub fn insert(&mut self, name: &'static str, value: Value) {
    self.claims.push((name, value));
  }

  pub fn is_empty(&self) -> bool { self.claims.is_empty() }

  pub fn len(&self) -> usize { self.claims.len() }
}

impl IntoIterator for ClaimFragment {
  type Item = (&'static str, Value);
  type IntoIter = std::vec::IntoIter<(&'static str, Value)>;

  fn into_iter(self) -> Self::IntoIter { self.claims.into_iter() }
}

// ─── Claim set ───────────────────────────────────────────────────────────────

/// An ordered map of claim name to value.
///
/// A claim keeps the position where it was first set, even when a later
/// provider overwrites its value, so equal inputs serialize to identical
/// bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ClaimSet(Map<String, Value>);

impl ClaimSet {
  pub fn new() -> Self { Self::default() }

  /// Apply a fragment on top of the current claims.
  pub fn merge(&mut self, fragment: ClaimFragment) {
    for (name, value) in fragment {
      self.0.insert(name.to_owned(), value);
    }
  }

  pub fn get(&self, name: &str) -> Option<&Value> { self.0.get(name) }

  /// The `sub` claim, if present as a non-empty string.
  pub fn subject(&self) -> Option<&str> {
    self.get(SUB).and_then(Value::as_str).filter(|s| !s.is_empty())
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> { self.0.iter() }

  pub fn into_inner(self) -> Map<String, Value> { self.0 }

  /// Compact JSON bytes, suitable for hashing.
  pub fn to_json_bytes(&self) -> crate::Result<Vec<u8>> {
    Ok(serde_json::to_vec(&self.0)?)
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn fragment_skips_absent_values() {
    let fragment = ClaimFragment::new()
      .with("given_name", Some(json!("Ada")))
      .with("family_name", None);
    assert_eq!(fragment.len(), 1);
  }

  #[test]
  fn overwrite_keeps_first_position() {
    let mut set = ClaimSet::new();
    set.merge(ClaimFragment::new().with("sub", Some(json!("1"))).with("amr", Some(json!(["pwd"]))));
    set.merge(ClaimFragment::new().with("ial", Some(json!("1"))));
    set.merge(ClaimFragment::new().with("amr", Some(json!(["pwd", "hwk"]))));

    let keys: Vec<&str> = set.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, ["sub", "amr", "ial"]);
    assert_eq!(set.get("amr"), Some(&json!(["pwd", "hwk"])));
    assert_eq!(
      String::from_utf8(set.to_json_bytes().unwrap()).unwrap(),
      r#"{"sub":"1","amr":["pwd","hwk"],"ial":"1"}"#
    );
  }

  #[test]
  fn null_or_empty_sub_is_not_a_subject() {
    let mut set = ClaimSet::new();
    set.merge(ClaimFragment::new().with("sub", Some(Value::Null)));
    assert_eq!(set.subject(), None);
    set.merge(ClaimFragment::new().with("sub", Some(json!(""))));
    assert_eq!(set.subject(), None);
    set.merge(ClaimFragment::new().with("sub", Some(json!("100000000000009"))));
    assert_eq!(set.subject(), Some("100000000000009"));
  }
}
