//! Subjects: the person or organization that claims are made about.
//!
//! A subject holds only identity metadata. Profile data, evidence and
//! authentication factors reference it by [`SubjectId`] and live elsewhere.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of entity a subject represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
  Person,
  Organization,
}

/// A checksum identifier: a 14-digit body followed by its Luhn check digit.
///
/// Assigned once at creation and never derived from mutable data.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for SubjectId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<String> for SubjectId {
  fn from(id: String) -> Self { Self(id) }
}

impl From<&str> for SubjectId {
  fn from(id: &str) -> Self { Self(id.to_owned()) }
}

/// A thin envelope around the identifier and a creation timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id: SubjectId,
  pub kind:       SubjectKind,
  pub created_at: DateTime<Utc>,
}
