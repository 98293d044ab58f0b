//! Error type for `vouch-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] vouch_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("corrupt row: {0}")]
  Corrupt(String),

  /// A second record was created for a fact that already has one.
  #[error("fact {0} already has a record")]
  DuplicateFact(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
