//! Error types for `vouch-core`.
//!
//! Only contract violations and lock contention surface as [`Error`]. Every
//! expected failure of a submission (timeouts, reverts, store outages) is
//! recorded on its [`SubmissionState`](crate::submission::SubmissionState)
//! instead.

use thiserror::Error;
use uuid::Uuid;

use crate::{
  address::Address,
  fact::{FactType, Role},
  ledger::LedgerError,
  record::RecordId,
  submission::SubmissionPhase,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed address: {0:?}")]
  InvalidAddress(String),

  #[error("unknown fact type: {0:?}")]
  UnknownFactType(String),

  #[error("unknown record status: {0:?}")]
  UnknownRecordStatus(String),

  #[error("unknown role: {0:?}")]
  UnknownRole(String),

  #[error("a {fact_type} submission for {subject} is already in flight ({fact_id})")]
  AlreadyInFlight {
    subject:   Address,
    fact_type: FactType,
    fact_id:   Uuid,
  },

  #[error("invalid submission transition {from} -> {to}")]
  InvalidTransition {
    from: SubmissionPhase,
    to:   SubmissionPhase,
  },

  #[error("{actor} holds role {held}, which may not perform this operation")]
  Unauthorized { actor: Address, held: Role },

  #[error("record not found: {0}")]
  RecordNotFound(RecordId),

  #[error("ledger and metadata store are both unavailable (ledger: {ledger}; store: {store})")]
  SourcesUnavailable { ledger: String, store: String },

  #[error("ledger error: {0}")]
  Ledger(#[from] LedgerError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("submission task aborted: {0}")]
  Task(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
