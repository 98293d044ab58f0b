//! [`MemoryLedger`] — a scriptable in-process ledger.

use std::{
  collections::{HashMap, VecDeque},
  sync::{Mutex, MutexGuard},
};

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
  address::Address,
  fact::{Fact, FactPayload, FactType},
  ledger::{LedgerClient, LedgerError, LedgerFact, ReceiptStatus, TxHandle, TxReceipt},
};

/// What happens to transactions accepted from now on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxOutcome {
  #[default]
  Confirm,
  Revert,
  /// Never mined; receipts stay unknown forever.
  Stall,
}

#[derive(Debug)]
struct PendingTx {
  fact:         Fact,
  outcome:      TxOutcome,
  /// Receipt polls still answered with "unknown".
  polls_left:   u32,
  polls:        u32,
  block_number: Option<u64>,
}

#[derive(Debug)]
struct State {
  txs:           HashMap<TxHandle, PendingTx>,
  by_fact:       HashMap<Uuid, TxHandle>,
  facts:         HashMap<(FactType, Address), LedgerFact>,
  submit_errors: VecDeque<LedgerError>,
  lost_acks:     u32,
  read_error:    Option<LedgerError>,
  outcome:       TxOutcome,
  polls_to_mine: u32,
  confirmations: u64,
  block_height:  u64,
  submit_calls:  u32,
}

/// A ledger that lives in memory.
///
/// Transactions are mined on the `polls_to_mine + 1`-th receipt poll and
/// arrive with `confirmations` confirmations. A confirmed transaction becomes
/// the current value of its `(fact_type, subject)`.
#[derive(Debug)]
pub struct MemoryLedger {
  state: Mutex<State>,
}

impl Default for MemoryLedger {
  fn default() -> Self { Self::new() }
}

impl MemoryLedger {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(State {
        txs:           HashMap::new(),
        by_fact:       HashMap::new(),
        facts:         HashMap::new(),
        submit_errors: VecDeque::new(),
        lost_acks:     0,
        read_error:    None,
        outcome:       TxOutcome::Confirm,
        polls_to_mine: 0,
        confirmations: 12,
        block_height:  1,
        submit_calls:  0,
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    // A panicking test thread must not wedge every later caller.
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  // ── Scripting ───────────────────────────────────────────────────────────

  /// Outcome for transactions submitted from now on.
  pub fn set_outcome(&self, outcome: TxOutcome) { self.lock().outcome = outcome; }

  /// Number of receipt polls answered "unknown" before a transaction is
  /// mined.
  pub fn set_polls_to_mine(&self, polls: u32) { self.lock().polls_to_mine = polls; }

  pub fn set_confirmations(&self, confirmations: u64) {
    self.lock().confirmations = confirmations;
  }

  /// Fail the next submissions with `errors`, in order, without recording
  /// anything.
  pub fn fail_next_submits(&self, errors: impl IntoIterator<Item = LedgerError>) {
    self.lock().submit_errors.extend(errors);
  }

  /// Accept the next `n` submissions but answer them with a network error,
  /// as if the acknowledgement was lost in transit.
  pub fn lose_next_acks(&self, n: u32) { self.lock().lost_acks = n; }

  /// Fail every `read_fact` with `error` until cleared with `None`.
  pub fn set_read_error(&self, error: Option<LedgerError>) {
    self.lock().read_error = error;
  }

  /// Write a fact straight into ledger state, bypassing submission.
  pub fn seed_fact(&self, fact: LedgerFact) {
    let mut state = self.lock();
    state
      .facts
      .insert((fact.fact_type, fact.subject.clone()), fact);
  }

  /// Confirm `payload` for `subject` as if it had been mined long ago.
  pub fn seed_confirmed(&self, subject: &Address, payload: FactPayload) -> LedgerFact {
    let fact = LedgerFact {
      fact_id:     Uuid::new_v4(),
      fact_type:   payload.fact_type(),
      subject:     subject.clone(),
      payload,
      tx:          TxHandle::new(format!("0x{}", hex::encode(Uuid::new_v4().as_bytes()))),
      confirmed:   true,
      recorded_at: Utc::now(),
    };
    self.seed_fact(fact.clone());
    fact
  }

  // ── Inspection ──────────────────────────────────────────────────────────

  /// Calls to `submit_fact`, including failed ones.
  pub fn submit_calls(&self) -> u32 { self.lock().submit_calls }

  /// Distinct transactions accepted.
  pub fn transaction_count(&self) -> usize { self.lock().txs.len() }

  /// Receipt polls made for `tx`.
  pub fn polls(&self, tx: &TxHandle) -> u32 {
    self.lock().txs.get(tx).map_or(0, |t| t.polls)
  }
}

fn tx_hash(fact: &Fact, nonce: u64) -> TxHandle {
  let mut hasher = Sha256::new();
  hasher.update(fact.fact_id.as_bytes());
  hasher.update(nonce.to_be_bytes());
  TxHandle::new(format!("0x{}", hex::encode(hasher.finalize())))
}

impl LedgerClient for MemoryLedger {
  async fn submit_fact(&self, fact: &Fact) -> Result<TxHandle, LedgerError> {
    let mut state = self.lock();
    state.submit_calls += 1;

    if let Some(err) = state.submit_errors.pop_front() {
      return Err(err);
    }
    if let Some(existing) = state.by_fact.get(&fact.fact_id) {
      return Err(LedgerError::Duplicate(existing.clone()));
    }

    state.block_height += 1;
    let tx = tx_hash(fact, state.block_height);
    let pending = PendingTx {
      fact:         fact.clone(),
      outcome:      state.outcome,
      polls_left:   state.polls_to_mine,
      polls:        0,
      block_number: None,
    };
    state.txs.insert(tx.clone(), pending);
    state.by_fact.insert(fact.fact_id, tx.clone());

    if state.lost_acks > 0 {
      state.lost_acks -= 1;
      return Err(LedgerError::Network("connection reset before acknowledgement".into()));
    }
    Ok(tx)
  }

  async fn receipt(&self, tx: &TxHandle) -> Result<Option<TxReceipt>, LedgerError> {
    let mut state = self.lock();
    let confirmations = state.confirmations;
    let height = state.block_height + 1;

    let Some(pending) = state.txs.get_mut(tx) else {
      return Ok(None);
    };
    pending.polls += 1;

    if pending.outcome == TxOutcome::Stall {
      return Ok(None);
    }
    if pending.polls_left > 0 {
      pending.polls_left -= 1;
      return Ok(None);
    }

    let first_sight = pending.block_number.is_none();
    let block_number = *pending.block_number.get_or_insert(height);
    let status = match pending.outcome {
      TxOutcome::Revert => ReceiptStatus::Reverted,
      _ => ReceiptStatus::Confirmed,
    };
    let mined = (first_sight && status == ReceiptStatus::Confirmed)
      .then(|| pending.fact.clone());

    if first_sight {
      state.block_height = height;
    }
    if let Some(fact) = mined {
      state.facts.insert((fact.fact_type, fact.subject.clone()), LedgerFact {
        fact_id:     fact.fact_id,
        fact_type:   fact.fact_type,
        subject:     fact.subject,
        payload:     fact.payload,
        tx:          tx.clone(),
        confirmed:   true,
        recorded_at: Utc::now(),
      });
    }

    Ok(Some(TxReceipt {
      tx: tx.clone(),
      status,
      confirmations,
      block_number: Some(block_number),
    }))
  }

  async fn read_fact(
    &self,
    fact_type: FactType,
    subject: &Address,
  ) -> Result<LedgerFact, LedgerError> {
    let state = self.lock();
    if let Some(err) = &state.read_error {
      return Err(err.clone());
    }
    state
      .facts
      .get(&(fact_type, subject.clone()))
      .cloned()
      .ok_or(LedgerError::NotFound)
  }
}
