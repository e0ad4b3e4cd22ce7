//! Checksum identifier generation and allocation.
//!
//! An identifier body is [`BODY_LEN`] digits: a leading digit selected by
//! subject kind, up to [`MAX_CHOSEN_DIGITS`] caller-chosen digits, then
//! random padding. A Luhn check digit computed over `prefix + body` is
//! appended. The prefix never appears in the emitted identifier; it only
//! feeds the check digit, so identifiers from a deployment with a different
//! prefix fail validation here.
//!
//! Generation does not guarantee uniqueness. [`allocate`] loops over
//! candidates against an insert that reports collisions, bounded by a retry
//! cap, and [`create_subject`] wires that loop to an [`IdentityStore`].

use std::future::Future;

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
  Error, Result,
  store::{IdentityStore, ledger_err},
  subject::{Subject, SubjectId, SubjectKind},
};

/// Digits in an identifier body, including the leading digit.
pub const BODY_LEN: usize = 14;

/// Caller-chosen digits beyond this are truncated.
pub const MAX_CHOSEN_DIGITS: usize = 10;

// ─── Luhn ────────────────────────────────────────────────────────────────────

/// Compute the Luhn check digit that makes `digits + check` valid.
///
/// Returns `None` if `digits` contains anything but ASCII digits.
pub fn luhn_check_digit(digits: &str) -> Option<u8> {
  let mut sum = 0u32;
  // The check digit will occupy position 0 from the right, so the rightmost
  // payload digit is the first one doubled.
  for (i, b) in digits.bytes().rev().enumerate() {
    if !b.is_ascii_digit() {
      return None;
    }
    let mut d = u32::from(b - b'0');
    if i % 2 == 0 {
      d *= 2;
      if d > 9 {
        d -= 9;
      }
    }
    sum += d;
  }
  Some(((10 - sum % 10) % 10) as u8)
}

/// Whether `number`, whose last digit is the check digit, passes Luhn.
pub fn luhn_valid(number: &str) -> bool {
  if number.len() < 2 || !number.bytes().all(|b| b.is_ascii_digit()) {
    return false;
  }
  let (payload, check) = number.split_at(number.len() - 1);
  luhn_check_digit(payload) == Some(check.as_bytes()[0] - b'0')
}

/// Validate `id` against the deployment `prefix`.
pub fn validate(prefix: &str, id: &SubjectId) -> bool {
  luhn_valid(&format!("{prefix}{id}"))
}

// ─── Generation ──────────────────────────────────────────────────────────────

/// Identifier settings, deserialised from the `[identifier]` config table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
  /// Digits prepended for the check digit computation only. May be empty.
  pub prefix:             String,
  pub person_digit:       char,
  pub organization_digit: char,
  /// Upper bound on candidates tried by [`allocate`].
  pub max_attempts:       u32,
}

impl Default for IdentifierConfig {
  fn default() -> Self {
    Self {
      prefix:             String::new(),
      person_digit:       '1',
      organization_digit: '2',
      max_attempts:       1000,
    }
  }
}

/// Emits checksum identifiers for a configured prefix.
#[derive(Debug, Clone)]
pub struct IdentifierGenerator {
  prefix:             String,
  person_digit:       char,
  organization_digit: char,
  max_attempts:       u32,
}

impl IdentifierGenerator {
  /// Build a generator, rejecting non-numeric prefixes or leading digits and
  /// a zero retry cap.
  pub fn new(config: &IdentifierConfig) -> Result<Self> {
    if !config.prefix.bytes().all(|b| b.is_ascii_digit()) {
      return Err(Error::InvalidIdentifierConfig(format!(
        "prefix {:?} must contain only decimal digits",
        config.prefix
      )));
    }
    for digit in [config.person_digit, config.organization_digit] {
      if !digit.is_ascii_digit() {
        return Err(Error::InvalidIdentifierConfig(format!(
          "leading digit {digit:?} is not a decimal digit"
        )));
      }
    }
    if config.max_attempts == 0 {
      return Err(Error::InvalidIdentifierConfig(
        "max_attempts must be at least 1".into(),
      ));
    }
    Ok(Self {
      prefix:             config.prefix.clone(),
      person_digit:       config.person_digit,
      organization_digit: config.organization_digit,
      max_attempts:       config.max_attempts,
    })
  }

  pub fn prefix(&self) -> &str { &self.prefix }

  pub fn max_attempts(&self) -> u32 { self.max_attempts }

  pub fn leading_digit(&self, kind: SubjectKind) -> char {
    match kind {
      SubjectKind::Person => self.person_digit,
      SubjectKind::Organization => self.organization_digit,
    }
  }

  /// Generate a candidate identifier for `kind`.
  pub fn generate(&self, kind: SubjectKind, chosen_digits: &str) -> SubjectId {
    compose(&self.prefix, self.leading_digit(kind), chosen_digits)
  }

  pub fn validate(&self, id: &SubjectId) -> bool { validate(&self.prefix, id) }
}

/// Generate an identifier from explicit parts.
pub fn generate(
  prefix: &str,
  leading_digit: char,
  chosen_digits: &str,
) -> Result<SubjectId> {
  if !prefix.bytes().all(|b| b.is_ascii_digit()) {
    return Err(Error::InvalidIdentifierConfig(format!(
      "prefix {prefix:?} must contain only decimal digits"
    )));
  }
  if !leading_digit.is_ascii_digit() {
    return Err(Error::InvalidIdentifierConfig(format!(
      "leading digit {leading_digit:?} is not a decimal digit"
    )));
  }
  Ok(compose(prefix, leading_digit, chosen_digits))
}

/// Inputs are already validated as digits.
fn compose(prefix: &str, leading_digit: char, chosen_digits: &str) -> SubjectId {
  let chosen = sanitize_chosen(chosen_digits);
  let mut body = String::with_capacity(BODY_LEN + 1);
  body.push(leading_digit);
  body.push_str(chosen);
  body.push_str(&random_digits(BODY_LEN - body.len()));

  let check = luhn_check_digit(&format!("{prefix}{body}")).unwrap_or(0);
  body.push(char::from(b'0' + check));
  SubjectId::new(body)
}

/// Non-numeric input is treated as empty; long input is truncated.
fn sanitize_chosen(chosen: &str) -> &str {
  if !chosen.bytes().all(|b| b.is_ascii_digit()) {
    return "";
  }
  &chosen[..chosen.len().min(MAX_CHOSEN_DIGITS)]
}

fn random_digits(n: usize) -> String {
  let mut out = String::with_capacity(n);
  let mut buf = [0u8; 16];
  while out.len() < n {
    OsRng.fill_bytes(&mut buf);
    // Rejecting 250..=255 keeps the digits uniform.
    for b in buf.into_iter().filter(|b| *b < 250) {
      if out.len() == n {
        break;
      }
      out.push(char::from(b'0' + b % 10));
    }
  }
  out
}

// ─── Allocation ──────────────────────────────────────────────────────────────

/// Try candidates from `candidate` until `insert` accepts one.
///
/// `insert` returns `Ok(None)` when the candidate is already taken, which
/// covers both a failed pre-check and a uniqueness violation at insert time.
/// Store failures abort immediately.
pub async fn allocate<T, C, F, Fut>(
  max_attempts: u32,
  mut candidate: C,
  mut insert: F,
) -> Result<T>
where
  C: FnMut() -> SubjectId,
  F: FnMut(SubjectId) -> Fut,
  Fut: Future<Output = Result<Option<T>>>,
{
  for attempt in 1..=max_attempts {
    let id = candidate();
    match insert(id.clone()).await? {
      Some(inserted) => return Ok(inserted),
      None => debug!(%id, attempt, "identifier collision, regenerating"),
    }
  }
  error!(attempts = max_attempts, "identifier allocation exhausted");
  Err(Error::IdentifierCollisionExhausted { attempts: max_attempts })
}

/// Create a subject of `kind` under a freshly allocated identifier.
pub async fn create_subject<S: IdentityStore>(
  store: &S,
  generator: &IdentifierGenerator,
  kind: SubjectKind,
  chosen_digits: &str,
) -> Result<Subject> {
  allocate(
    generator.max_attempts(),
    || generator.generate(kind, chosen_digits),
    move |id| async move {
      if store.subject_exists(id.clone()).await.map_err(ledger_err)? {
        return Ok(None);
      }
      store.try_add_subject(id, kind).await.map_err(ledger_err)
    },
  )
  .await
}
