//! Error type for `assura-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A domain rejection raised while applying a change inside a
  /// transaction. Converts back into itself.
  #[error("core error: {0}")]
  Core(#[from] assura_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {column} value in database: {value:?}")]
  UnknownValue { column: &'static str, value: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for assura_core::Error {
  fn from(error: Error) -> Self {
    match error {
      Error::Core(inner) => inner,
      other => assura_core::Error::ledger(other),
    }
  }
}
