//! Records — the off-chain representation of a fact.
//!
//! A record is mutable and owned by the metadata store, but its `status` and
//! `linked_tx_hash` are only ever written by the
//! [`FactCoordinator`](crate::coordinator::FactCoordinator).

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  address::Address,
  fact::{Fact, FactPayload, FactType},
};

/// Store-assigned identifier of a record.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
  pub fn new() -> Self { Self(Uuid::new_v4()) }
}

impl Default for RecordId {
  fn default() -> Self { Self::new() }
}

impl fmt::Display for RecordId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

/// Off-chain verification status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
  Pending,
  Verified,
  Rejected,
}

impl RecordStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Verified => "verified",
      Self::Rejected => "rejected",
    }
  }
}

impl fmt::Display for RecordStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for RecordStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(Self::Pending),
      "verified" => Ok(Self::Verified),
      "rejected" => Ok(Self::Rejected),
      other => Err(Error::UnknownRecordStatus(other.to_owned())),
    }
  }
}

/// A persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
  pub record_id:      RecordId,
  /// The fact this record describes. Ledger facts carry the same id, which is
  /// how the two sides are matched up when reconciling.
  pub fact_id:        Uuid,
  pub subject:        Address,
  pub fact_type:      FactType,
  pub status:         RecordStatus,
  pub linked_tx_hash: Option<String>,
  pub actor:          Option<Address>,
  pub reason:         Option<String>,
  pub payload:        FactPayload,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}

/// Input to [`crate::store::MetadataStore::create`]. Records always start
/// out `Pending`; ids and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewRecord {
  pub fact_id:   Uuid,
  pub subject:   Address,
  pub fact_type: FactType,
  pub payload:   FactPayload,
  pub actor:     Option<Address>,
}

impl From<&Fact> for NewRecord {
  fn from(fact: &Fact) -> Self {
    Self {
      fact_id:   fact.fact_id,
      subject:   fact.subject.clone(),
      fact_type: fact.fact_type,
      payload:   fact.payload.clone(),
      actor:     fact.actor.clone(),
    }
  }
}

/// Input to [`crate::store::MetadataStore::update_status`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
  pub status:         RecordStatus,
  pub actor:          Option<Address>,
  pub reason:         Option<String>,
  /// Left untouched in the store when `None`.
  pub linked_tx_hash: Option<String>,
}
