//! [`StatusMerger`] — one authoritative status from two sources.
//!
//! The ledger decides verified-or-not; the store supplies the detail. A store
//! record that claims `Verified` without a confirmed ledger fact behind it is
//! never reported as verified. Disagreements the precedence rules do not
//! cover come out as [`ResolvedStatus::Inconsistent`] so an operator can find
//! them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  address::Address,
  fact::FactType,
  ledger::{LedgerClient, LedgerError},
  record::{Record, RecordId, RecordStatus},
  store::MetadataStore,
};

// ─── Views ───────────────────────────────────────────────────────────────────

/// What the ledger said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LedgerStatus {
  Confirmed {
    /// `Verified` or `Rejected`, per the confirmed payload.
    decision: RecordStatus,
    fact_id:  Uuid,
    tx_hash:  String,
  },
  Unconfirmed {
    fact_id: Uuid,
    tx_hash: String,
  },
  Absent,
  Unavailable {
    error: String,
  },
}

/// What the store said about the most recent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StoreStatus {
  Present {
    status:    RecordStatus,
    record_id: RecordId,
  },
  Absent,
  Unavailable {
    error: String,
  },
}

/// The merged, user-visible status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedStatus {
  /// Nothing has been submitted.
  Unverified,
  Pending,
  Verified,
  Rejected,
  /// The sources disagree; needs manual reconciliation.
  Inconsistent,
  /// The latest submission failed. Only produced by
  /// [`VerificationWorkflow::status`](crate::workflow::VerificationWorkflow::status),
  /// which knows about submissions; the merger itself only sees records.
  Failed,
}

impl ResolvedStatus {
  /// Statuses an operator must act on.
  pub fn needs_attention(self) -> bool {
    matches!(self, Self::Inconsistent | Self::Failed)
  }
}

impl From<RecordStatus> for ResolvedStatus {
  fn from(s: RecordStatus) -> Self {
    match s {
      RecordStatus::Pending => Self::Pending,
      RecordStatus::Verified => Self::Verified,
      RecordStatus::Rejected => Self::Rejected,
    }
  }
}

/// Ephemeral merged view. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct MergedStatus {
  pub subject:         Address,
  pub fact_type:       FactType,
  pub ledger_status:   LedgerStatus,
  pub store_status:    StoreStatus,
  pub resolved_status: ResolvedStatus,
  /// One of the two sources could not be read.
  pub degraded:        bool,
  /// The most recent record, for auxiliary detail (reason, actor, payload).
  pub record:          Option<Record>,
  pub as_of:           DateTime<Utc>,
}

// ─── Merger ──────────────────────────────────────────────────────────────────

pub struct StatusMerger<L, M> {
  ledger: Arc<L>,
  store:  Arc<M>,
}

impl<L, M> Clone for StatusMerger<L, M> {
  fn clone(&self) -> Self {
    Self { ledger: self.ledger.clone(), store: self.store.clone() }
  }
}

impl<L, M> StatusMerger<L, M>
where
  L: LedgerClient,
  M: MetadataStore,
{
  pub fn new(ledger: Arc<L>, store: Arc<M>) -> Self { Self { ledger, store } }

  /// Merge the ledger's and the store's view of `(subject, fact_type)`.
  ///
  /// Read-only. Fails only when neither source can be read.
  pub async fn resolve(
    &self,
    subject: &Address,
    fact_type: FactType,
  ) -> Result<MergedStatus> {
    let (ledger, records) = tokio::join!(
      self.ledger.read_fact(fact_type, subject),
      self.store.find(subject, fact_type),
    );

    let ledger_status = match ledger {
      Ok(f) if f.confirmed => LedgerStatus::Confirmed {
        decision: f.payload.decision().record_status(),
        fact_id:  f.fact_id,
        tx_hash:  f.tx.tx_hash().to_owned(),
      },
      Ok(f) => LedgerStatus::Unconfirmed {
        fact_id: f.fact_id,
        tx_hash: f.tx.tx_hash().to_owned(),
      },
      Err(LedgerError::NotFound) => LedgerStatus::Absent,
      Err(e) => LedgerStatus::Unavailable { error: e.to_string() },
    };

    let (record, store_status) = match records {
      // `find` returns newest first.
      Ok(rs) => match rs.into_iter().next() {
        Some(r) => {
          let status = StoreStatus::Present {
            status:    r.status,
            record_id: r.record_id,
          };
          (Some(r), status)
        }
        None => (None, StoreStatus::Absent),
      },
      Err(e) => (None, StoreStatus::Unavailable { error: e.to_string() }),
    };

    if let (
      LedgerStatus::Unavailable { error: ledger_err },
      StoreStatus::Unavailable { error: store_err },
    ) = (&ledger_status, &store_status)
    {
      return Err(Error::SourcesUnavailable {
        ledger: ledger_err.clone(),
        store:  store_err.clone(),
      });
    }

    let degraded = matches!(ledger_status, LedgerStatus::Unavailable { .. })
      || matches!(store_status, StoreStatus::Unavailable { .. });
    let store_available = !matches!(store_status, StoreStatus::Unavailable { .. });
    let resolved_status = precedence(&ledger_status, record.as_ref(), store_available);

    if resolved_status == ResolvedStatus::Inconsistent {
      tracing::warn!(%subject, %fact_type, ?ledger_status, ?store_status, "ledger and store disagree");
    } else if degraded {
      tracing::debug!(%subject, %fact_type, ?ledger_status, ?store_status, "resolved from a single source");
    }

    Ok(MergedStatus {
      subject: subject.clone(),
      fact_type,
      ledger_status,
      store_status,
      resolved_status,
      degraded,
      record,
      as_of: Utc::now(),
    })
  }
}

/// The fixed precedence rule.
///
/// A confirmed ledger fact decides the outcome, provided the store agrees:
/// the record for the same fact must carry the same verdict and link the
/// confirming transaction. A newer record for a different fact is a later
/// attempt still in flight (or one that never reached the ledger) unless it
/// claims `Verified`, which only a confirmed fact may justify.
///
/// Without a confirmed ledger fact, the store can only ever hold a
/// submission back (`Pending`) or reject it.
fn precedence(
  ledger: &LedgerStatus,
  record: Option<&Record>,
  store_available: bool,
) -> ResolvedStatus {
  match ledger {
    LedgerStatus::Confirmed { decision, fact_id, tx_hash } => {
      if !store_available {
        return (*decision).into();
      }
      match record {
        None => ResolvedStatus::Inconsistent,
        Some(r) if r.fact_id == *fact_id => {
          if r.status == *decision
            && r.linked_tx_hash.as_deref() == Some(tx_hash.as_str())
          {
            (*decision).into()
          } else {
            ResolvedStatus::Inconsistent
          }
        }
        Some(r) if r.status == RecordStatus::Verified => {
          ResolvedStatus::Inconsistent
        }
        Some(_) => (*decision).into(),
      }
    }
    LedgerStatus::Unconfirmed { .. }
    | LedgerStatus::Absent
    | LedgerStatus::Unavailable { .. } => match record.map(|r| r.status) {
      Some(RecordStatus::Verified | RecordStatus::Pending) => {
        ResolvedStatus::Pending
      }
      Some(RecordStatus::Rejected) => ResolvedStatus::Rejected,
      None => ResolvedStatus::Unverified,
    },
  }
}
