//! The `LedgerClient` port and the transaction types it trades in.
//!
//! Signing, gas estimation and RPC transport all live behind this trait.
//! Vouch only needs to submit a fact, learn whether the transaction landed,
//! and read back the current on-chain value for a subject.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
  address::Address,
  fact::{Fact, FactPayload, FactType},
};

// ─── Transactions ────────────────────────────────────────────────────────────

/// Handle to a transaction accepted by the ledger. Always a real transaction
/// hash; clients never synthesise placeholder handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(String);

impl TxHandle {
  pub fn new(tx_hash: impl Into<String>) -> Self { Self(tx_hash.into()) }

  pub fn tx_hash(&self) -> &str { &self.0 }
}

impl std::fmt::Display for TxHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
  Confirmed,
  Reverted,
  /// The node does not (yet) know the outcome.
  Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
  pub tx:            TxHandle,
  pub status:        ReceiptStatus,
  pub confirmations: u64,
  pub block_number:  Option<u64>,
}

/// The current on-chain value for a `(fact_type, subject)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerFact {
  /// Id of the fact that produced this value.
  pub fact_id:     Uuid,
  pub fact_type:   FactType,
  pub subject:     Address,
  pub payload:     FactPayload,
  pub tx:          TxHandle,
  /// Whether the producing transaction has reached finality.
  pub confirmed:   bool,
  pub recorded_at: DateTime<Utc>,
}

/// Stand-in deadline for timeouts that overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
  #[error("signing failed: {0}")]
  SigningFailed(String),

  #[error("ledger network error: {0}")]
  Network(String),

  /// The ledger already holds a transaction for this fact id.
  #[error("fact already submitted in {0}")]
  Duplicate(TxHandle),

  /// The ledger declined the submission outright (e.g. a failed pre-flight
  /// check). Resubmitting the same fact will not help.
  #[error("ledger refused the submission: {0}")]
  Refused(String),

  #[error("no confirmation within {0:?}")]
  Timeout(Duration),

  #[error("no fact recorded")]
  NotFound,
}

impl LedgerError {
  /// Whether resubmitting the same fact may succeed.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::SigningFailed(_) | Self::Network(_))
  }
}

// ─── Confirmation policy ─────────────────────────────────────────────────────

/// How long and how often to poll for a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPolicy {
  pub min_confirmations: u64,
  pub timeout:           Duration,
  /// Delay before the second poll; doubled after every poll.
  pub initial_poll:      Duration,
  pub max_poll:          Duration,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the ledger.
///
/// Instances are constructed explicitly and shared by `Arc`; there is no
/// process-wide contract handle.
pub trait LedgerClient: Send + Sync {
  /// Submit `fact` as a new transaction.
  ///
  /// Implementations must reject a second submission carrying the same
  /// `fact.fact_id` with [`LedgerError::Duplicate`], naming the original
  /// transaction.
  fn submit_fact<'a>(
    &'a self,
    fact: &'a Fact,
  ) -> impl Future<Output = Result<TxHandle, LedgerError>> + Send + 'a;

  /// Look up the receipt for `tx`. `None` while the transaction is unmined.
  fn receipt<'a>(
    &'a self,
    tx: &'a TxHandle,
  ) -> impl Future<Output = Result<Option<TxReceipt>, LedgerError>> + Send + 'a;

  /// Read the current value of `fact_type` for `subject`.
  ///
  /// Returns [`LedgerError::NotFound`] when nothing was ever recorded.
  fn read_fact<'a>(
    &'a self,
    fact_type: FactType,
    subject: &'a Address,
  ) -> impl Future<Output = Result<LedgerFact, LedgerError>> + Send + 'a;

  /// Wait until `tx` is confirmed with at least `policy.min_confirmations`
  /// or reverted, polling [`receipt`](Self::receipt) with exponential
  /// backoff. Errors while polling are treated as "not yet known".
  ///
  /// Returns [`LedgerError::Timeout`] once `policy.timeout` elapses.
  fn await_confirmation<'a>(
    &'a self,
    tx: &'a TxHandle,
    policy: &'a ConfirmationPolicy,
  ) -> impl Future<Output = Result<TxReceipt, LedgerError>> + Send + 'a {
    async move {
      let start = Instant::now();
      // A timeout too large to represent never expires.
      let deadline = start
        .checked_add(policy.timeout)
        .unwrap_or_else(|| start + FAR_FUTURE);
      let mut delay = policy.initial_poll;

      loop {
        match self.receipt(tx).await {
          Ok(Some(r)) if r.status == ReceiptStatus::Reverted => return Ok(r),
          Ok(Some(r))
            if r.status == ReceiptStatus::Confirmed
              && r.confirmations >= policy.min_confirmations =>
          {
            return Ok(r);
          }
          Ok(_) => {}
          Err(e) => {
            tracing::debug!(tx = %tx, error = %e, "receipt poll failed");
          }
        }

        let now = Instant::now();
        if now >= deadline {
          return Err(LedgerError::Timeout(policy.timeout));
        }
        tokio::time::sleep(delay.min(deadline - now)).await;
        delay = delay.saturating_mul(2).min(policy.max_poll);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    fact::{DocumentHashValue, FactPayload},
    memory::{MemoryLedger, TxOutcome},
  };

  fn policy() -> ConfirmationPolicy {
    ConfirmationPolicy {
      min_confirmations: 2,
      timeout:           Duration::from_secs(30),
      initial_poll:      Duration::from_secs(1),
      max_poll:          Duration::from_secs(4),
    }
  }

  fn fact() -> Fact {
    Fact::new(
      Address::parse("0x6666666666666666666666666666666666666666").unwrap(),
      FactPayload::DocumentHash(DocumentHashValue::from_bytes("id", b"x")),
      None,
    )
  }

  #[test]
  fn only_signing_and_network_errors_are_transient() {
    assert!(LedgerError::SigningFailed("x".into()).is_transient());
    assert!(LedgerError::Network("x".into()).is_transient());
    assert!(!LedgerError::Refused("x".into()).is_transient());
    assert!(!LedgerError::Duplicate(TxHandle::new("0x1")).is_transient());
  }

  #[tokio::test(start_paused = true)]
  async fn waits_with_backoff_until_mined() {
    let ledger = MemoryLedger::new();
    ledger.set_polls_to_mine(3);
    let tx = ledger.submit_fact(&fact()).await.unwrap();

    let start = Instant::now();
    let receipt = ledger.await_confirmation(&tx, &policy()).await.unwrap();

    assert_eq!(receipt.status, ReceiptStatus::Confirmed);
    assert_eq!(ledger.polls(&tx), 4);
    // Sleeps of 1s, 2s and 4s between the four polls.
    assert_eq!(start.elapsed(), Duration::from_secs(7));
  }

  #[tokio::test(start_paused = true)]
  async fn unbounded_policy_values_do_not_overflow() {
    let ledger = MemoryLedger::new();
    ledger.set_polls_to_mine(3);
    let tx = ledger.submit_fact(&fact()).await.unwrap();
    let policy = ConfirmationPolicy {
      min_confirmations: 2,
      timeout:           Duration::MAX,
      initial_poll:      Duration::from_secs(1),
      max_poll:          Duration::MAX,
    };

    let receipt = ledger.await_confirmation(&tx, &policy).await.unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Confirmed);
    assert_eq!(ledger.polls(&tx), 4);
  }

  #[tokio::test(start_paused = true)]
  async fn too_few_confirmations_time_out() {
    let ledger = MemoryLedger::new();
    ledger.set_confirmations(1);
    let tx = ledger.submit_fact(&fact()).await.unwrap();

    let err = ledger.await_confirmation(&tx, &policy()).await.unwrap_err();
    assert_eq!(err, LedgerError::Timeout(Duration::from_secs(30)));
  }

  #[tokio::test(start_paused = true)]
  async fn revert_returns_immediately() {
    let ledger = MemoryLedger::new();
    ledger.set_outcome(TxOutcome::Revert);
    let tx = ledger.submit_fact(&fact()).await.unwrap();

    let receipt = ledger.await_confirmation(&tx, &policy()).await.unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Reverted);
    assert_eq!(ledger.polls(&tx), 1);
  }
}
