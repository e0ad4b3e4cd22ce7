//! Profile data read by claim providers.
//!
//! None of these types carry assurance meaning on their own; they are the
//! raw material the profile, address, document and organization providers
//! turn into claims.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::subject::SubjectId;

/// User-editable profile fields. Every field is optional so a profile can be
/// filled in incrementally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
  pub given_name:     Option<String>,
  pub family_name:    Option<String>,
  pub nickname:       Option<String>,
  pub birthdate:      Option<NaiveDate>,
  pub gender:         Option<String>,
  pub email:          Option<String>,
  pub email_verified: bool,
  pub phone_number:   Option<String>,
  pub phone_verified: bool,
}

impl Profile {
  /// Display name built from the given and family names.
  pub fn full_name(&self) -> Option<String> {
    let parts: Vec<&str> = [&self.given_name, &self.family_name]
      .into_iter()
      .filter_map(|p| p.as_deref())
      .filter(|p| !p.is_empty())
      .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
  }
}

/// A profile as persisted, with the annotations the store maintains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProfile {
  pub subject_id:      SubjectId,
  #[serde(flatten)]
  pub profile:         Profile,
  /// The subject that last recorded evidence for this one. Set when
  /// evidence is recorded with a verifier and cleared when evidence is
  /// deleted.
  pub verifying_agent: Option<SubjectId>,
  pub updated_at:      DateTime<Utc>,
}

/// A postal address (maps to the OIDC `address` claim).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
  pub street_1:    Option<String>,
  pub street_2:    Option<String>,
  /// City or locality.
  pub locality:    Option<String>,
  /// State, province, or region.
  pub region:      Option<String>,
  pub postal_code: Option<String>,
  pub country:     Option<String>,
}

impl Address {
  /// Street lines joined by newline, as OIDC `street_address` expects.
  pub fn street_address(&self) -> Option<String> {
    let lines: Vec<&str> = [&self.street_1, &self.street_2]
      .into_iter()
      .filter_map(|l| l.as_deref())
      .filter(|l| !l.is_empty())
      .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
  }

  /// Single-line rendering of every populated component.
  pub fn formatted(&self) -> String {
    let region_line = [&self.region, &self.postal_code]
      .into_iter()
      .filter_map(|p| p.as_deref())
      .filter(|p| !p.is_empty())
      .collect::<Vec<_>>()
      .join(" ");

    [
      self.street_1.as_deref(),
      self.street_2.as_deref(),
      self.locality.as_deref(),
      Some(region_line.as_str()),
      self.country.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|p| !p.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
  }
}

/// An identifier issued to the subject by some authority (member ID,
/// license number, medical record number...). Serialises directly into the
/// shape of one `document` claim entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIdentifier {
  #[serde(rename = "type")]
  pub kind:        String,
  #[serde(rename = "num")]
  pub number:      String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub issuer:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub country:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subdivision: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uri:         Option<String>,
}

/// Membership of the subject in an organization that is itself a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affiliation {
  pub organization_id: SubjectId,
  pub name:            String,
  #[serde(default)]
  pub slug:            Option<String>,
  #[serde(default)]
  pub role:            Option<String>,
}
