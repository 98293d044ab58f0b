//! Submission state — the per-fact tracking object of the verification
//! workflow.
//!
//! A [`SubmissionState`] is the single source of truth for where a fact is in
//! its dual write. API clients poll or subscribe to it; nothing optimistically
//! reports progress ahead of it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  address::Address,
  fact::{Fact, FactType},
  ledger::TxHandle,
  record::RecordId,
};

// ─── Phase ───────────────────────────────────────────────────────────────────

/// Where a submission is in its lifecycle.
///
/// ```text
/// Submitted ─▶ LedgerPending ─▶ LedgerConfirmed ─▶ StorePending ─▶ Reconciled
///     │              │                 │                 │
///     └──────────────┴─────────────────┴─────────────────┴──▶ Failed
///     └──────────────┴──▶ Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPhase {
  Submitted,
  LedgerPending,
  LedgerConfirmed,
  StorePending,
  /// The store acknowledged the update but the cross-reference has not yet
  /// been checked. The coordinator checks it in the same step, so it moves
  /// from `StorePending` straight to `Reconciled`; other drivers may stop
  /// here.
  StoreConfirmed,
  Reconciled,
  Failed,
  Rejected,
}

impl SubmissionPhase {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Reconciled | Self::Failed | Self::Rejected)
  }

  pub fn can_advance_to(self, next: Self) -> bool {
    use SubmissionPhase::*;
    matches!(
      (self, next),
      (Submitted, LedgerPending | Failed | Rejected)
        | (LedgerPending, LedgerConfirmed | Failed | Rejected)
        | (LedgerConfirmed, StorePending | Failed)
        | (StorePending, StoreConfirmed | Reconciled | Failed)
        | (StoreConfirmed, Reconciled | Failed)
    )
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Submitted => "submitted",
      Self::LedgerPending => "ledger_pending",
      Self::LedgerConfirmed => "ledger_confirmed",
      Self::StorePending => "store_pending",
      Self::StoreConfirmed => "store_confirmed",
      Self::Reconciled => "reconciled",
      Self::Failed => "failed",
      Self::Rejected => "rejected",
    }
  }
}

impl fmt::Display for SubmissionPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Error kinds ─────────────────────────────────────────────────────────────

/// Why a submission ended up `Failed` or `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// The store refused the initial record; nothing reached the ledger.
  StoreCreate,
  /// The ledger never accepted the transaction (retries exhausted).
  LedgerSubmission,
  /// The ledger declined the transaction outright.
  LedgerRefused,
  /// No receipt arrived within the confirmation window.
  LedgerTimeout,
  LedgerReverted,
  /// The ledger fact is final but the store could not be updated.
  StoreUpdate,
  /// The store acknowledged an update that does not point back at the
  /// confirmed transaction.
  CrossReferenceMismatch,
  WorkflowTimeout,
  /// The driving task stopped before reaching a terminal state.
  Aborted,
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
  pub state: SubmissionPhase,
  pub at:    DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionState {
  pub fact_id:      Uuid,
  pub subject:      Address,
  pub fact_type:    FactType,
  pub state:        SubmissionPhase,
  pub tx_handle:    Option<TxHandle>,
  pub record_id:    Option<RecordId>,
  /// Retries across both the ledger submission and the store update.
  pub retry_count:  u32,
  pub last_error:   Option<ErrorKind>,
  /// Human-readable detail for `last_error`.
  pub error_detail: Option<String>,
  /// Every phase entered, in order, starting with `Submitted`.
  pub history:      Vec<StateChange>,
}

impl SubmissionState {
  pub fn new(fact: &Fact) -> Self {
    Self {
      fact_id:      fact.fact_id,
      subject:      fact.subject.clone(),
      fact_type:    fact.fact_type,
      state:        SubmissionPhase::Submitted,
      tx_handle:    None,
      record_id:    None,
      retry_count:  0,
      last_error:   None,
      error_detail: None,
      history:      vec![StateChange {
        state: SubmissionPhase::Submitted,
        at:    fact.submitted_at,
      }],
    }
  }

  pub fn is_terminal(&self) -> bool { self.state.is_terminal() }

  /// Move to `next`, refusing transitions the lifecycle does not allow.
  /// Terminal states never change.
  pub fn advance(&mut self, next: SubmissionPhase) -> Result<()> {
    if !self.state.can_advance_to(next) {
      return Err(Error::InvalidTransition { from: self.state, to: next });
    }
    self.state = next;
    self.history.push(StateChange { state: next, at: Utc::now() });
    Ok(())
  }

  /// Move to `Failed`, recording why.
  pub fn fail(
    &mut self,
    kind: ErrorKind,
    detail: impl Into<String>,
  ) -> Result<()> {
    self.advance(SubmissionPhase::Failed)?;
    self.last_error = Some(kind);
    self.error_detail = Some(detail.into());
    Ok(())
  }

  /// Move to `Rejected`, recording why.
  pub fn reject(
    &mut self,
    kind: ErrorKind,
    detail: impl Into<String>,
  ) -> Result<()> {
    self.advance(SubmissionPhase::Rejected)?;
    self.last_error = Some(kind);
    self.error_detail = Some(detail.into());
    Ok(())
  }

  /// The phases entered so far, in order.
  pub fn phases(&self) -> Vec<SubmissionPhase> {
    self.history.iter().map(|c| c.state).collect()
  }
}
