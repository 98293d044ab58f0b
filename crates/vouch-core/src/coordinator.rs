//! [`FactCoordinator`] — the dual write of one fact to the metadata store and
//! the ledger.
//!
//! The order is fixed:
//!
//! 1. create the store record (`Pending`), so an audit row exists even if
//!    the ledger never hears about the fact;
//! 2. submit to the ledger, retrying transient failures with backoff;
//! 3. wait for a receipt;
//! 4. write the ledger's verdict and transaction hash back to the record.
//!
//! Expected failures never escape as errors. They end the submission in
//! `Failed` or `Rejected` with the cause recorded on the returned
//! [`SubmissionState`].

use std::{future::Future, sync::Arc};

use serde::Serialize;

use crate::{
  Error, Result,
  address::Address,
  config::CoordinatorConfig,
  fact::{Fact, FactType},
  ledger::{LedgerClient, LedgerError, ReceiptStatus, TxHandle, TxReceipt},
  record::{NewRecord, Record, RecordId, RecordStatus, StatusUpdate},
  role::RoleCache,
  store::MetadataStore,
  submission::{ErrorKind, SubmissionPhase, SubmissionState},
};

/// Reason written to a record whose ledger transaction reverted.
pub const LEDGER_REVERTED: &str = "ledger-reverted";

/// Outcome of [`FactCoordinator::reconcile`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum ReconcileOutcome {
  /// The record was brought in line with the confirmed ledger fact.
  Repaired(Record),
  /// The record already matched the ledger.
  AlreadyConsistent(Record),
  /// The ledger holds no confirmed fact for this record; nothing to copy.
  LedgerUnconfirmed(Record),
  /// The ledger's current fact belongs to a different submission.
  Superseded(Record),
}

pub struct FactCoordinator<L, M> {
  ledger: Arc<L>,
  store:  Arc<M>,
  config: CoordinatorConfig,
  roles:  Option<Arc<RoleCache<L>>>,
}

impl<L, M> FactCoordinator<L, M>
where
  L: LedgerClient,
  M: MetadataStore,
{
  pub fn new(ledger: Arc<L>, store: Arc<M>, config: CoordinatorConfig) -> Self {
    Self { ledger, store, config, roles: None }
  }

  /// Invalidate `roles` whenever a role assignment finishes.
  pub fn with_role_cache(mut self, roles: Arc<RoleCache<L>>) -> Self {
    self.roles = Some(roles);
    self
  }

  pub fn ledger(&self) -> &Arc<L> { &self.ledger }

  pub fn store(&self) -> &Arc<M> { &self.store }

  pub fn config(&self) -> &CoordinatorConfig { &self.config }

  /// Run the dual write for `fact` to completion.
  pub async fn submit(&self, fact: &Fact) -> SubmissionState {
    self.submit_observed(fact, |_| {}).await
  }

  /// Like [`submit`](Self::submit), calling `observe` with every state change
  /// after the initial `Submitted` one, up to and including the final state.
  ///
  /// A role assignment's subject is dropped from the role cache before its
  /// terminal state reaches `observe`.
  pub async fn submit_observed<F>(
    &self,
    fact: &Fact,
    mut observe: F,
  ) -> SubmissionState
  where
    F: FnMut(&SubmissionState) + Send,
  {
    let mut state = SubmissionState::new(fact);
    let changes_role = fact.fact_type == FactType::RoleAssignment;
    let mut observe = |s: &SubmissionState| {
      if changes_role && s.is_terminal() {
        self.invalidate_role(&s.subject);
      }
      observe(s);
    };

    self.run(fact, &mut state, &mut observe).await;

    tracing::info!(
      fact_id = %fact.fact_id,
      subject = %fact.subject,
      fact_type = %fact.fact_type,
      state = %state.state,
      last_error = ?state.last_error,
      retries = state.retry_count,
      "submission finished"
    );
    state
  }

  async fn run<F>(&self, fact: &Fact, state: &mut SubmissionState, observe: &mut F)
  where
    F: FnMut(&SubmissionState) + Send,
  {
    // ── 1. Store record ───────────────────────────────────────────────────
    let record = match self.store_io(self.store.create(NewRecord::from(fact))).await
    {
      Ok(r) => r,
      Err(detail) => {
        tracing::warn!(fact_id = %fact.fact_id, %detail, "store create failed; ledger not contacted");
        step(state, observe, |s| s.fail(ErrorKind::StoreCreate, detail));
        return;
      }
    };
    state.record_id = Some(record.record_id);
    observe(state);

    // ── 2. Ledger submission ──────────────────────────────────────────────
    let tx = match self.submit_to_ledger(fact, state).await {
      Ok(tx) => tx,
      Err(LedgerError::Refused(reason)) => {
        tracing::warn!(fact_id = %fact.fact_id, %reason, "ledger refused submission");
        self
          .write_rejection(fact, record.record_id, reason.clone(), None)
          .await;
        step(state, observe, |s| s.reject(ErrorKind::LedgerRefused, reason));
        return;
      }
      Err(e) => {
        tracing::warn!(fact_id = %fact.fact_id, error = %e, "ledger submission failed");
        step(state, observe, |s| {
          s.fail(ErrorKind::LedgerSubmission, e.to_string())
        });
        return;
      }
    };
    state.tx_handle = Some(tx.clone());
    step(state, observe, |s| s.advance(SubmissionPhase::LedgerPending));

    // ── 3. Confirmation ───────────────────────────────────────────────────
    let policy = self.config.confirmation_policy();
    let receipt = match self.ledger.await_confirmation(&tx, &policy).await {
      Ok(r) => r,
      Err(e) => {
        // The record stays `Pending` so it shows up as a stuck submission.
        tracing::warn!(fact_id = %fact.fact_id, %tx, error = %e, "no ledger confirmation");
        step(state, observe, |s| s.fail(ErrorKind::LedgerTimeout, e.to_string()));
        return;
      }
    };

    if receipt.status == ReceiptStatus::Reverted {
      tracing::info!(fact_id = %fact.fact_id, %tx, "ledger transaction reverted");
      self
        .write_rejection(
          fact,
          record.record_id,
          LEDGER_REVERTED.to_owned(),
          Some(tx.tx_hash().to_owned()),
        )
        .await;
      step(state, observe, |s| s.reject(ErrorKind::LedgerReverted, LEDGER_REVERTED));
      return;
    }
    step(state, observe, |s| s.advance(SubmissionPhase::LedgerConfirmed));

    // ── 4. Store update ───────────────────────────────────────────────────
    step(state, observe, |s| s.advance(SubmissionPhase::StorePending));
    self
      .finalize_record(fact, record.record_id, &receipt, state, observe)
      .await;
  }

  /// Submit to the ledger with bounded retries. A duplicate rejection means
  /// an earlier attempt landed after all; its transaction is adopted.
  async fn submit_to_ledger(
    &self,
    fact: &Fact,
    state: &mut SubmissionState,
  ) -> Result<TxHandle, LedgerError> {
    let policy = self.config.ledger_retry();
    let mut attempt = 0;
    loop {
      attempt += 1;
      match self.ledger.submit_fact(fact).await {
        Ok(tx) => return Ok(tx),
        Err(LedgerError::Duplicate(tx)) => {
          tracing::info!(fact_id = %fact.fact_id, %tx, "ledger already holds fact; adopting transaction");
          return Ok(tx);
        }
        Err(e) if e.is_transient() && attempt < policy.max_attempts => {
          let delay = policy.delay_after(attempt);
          tracing::warn!(
            fact_id = %fact.fact_id,
            attempt,
            error = %e,
            ?delay,
            "ledger submission failed; retrying"
          );
          state.retry_count += 1;
          tokio::time::sleep(delay).await;
        }
        Err(e) => return Err(e),
      }
    }
  }

  /// Write the confirmed verdict into the record and check that the store
  /// now points at the confirmed transaction.
  async fn finalize_record<F>(
    &self,
    fact: &Fact,
    record_id: RecordId,
    receipt: &TxReceipt,
    state: &mut SubmissionState,
    observe: &mut F,
  ) where
    F: FnMut(&SubmissionState) + Send,
  {
    let decision = fact.payload.decision();
    let expected = decision.record_status();
    let tx_hash = receipt.tx.tx_hash().to_owned();
    let update = StatusUpdate {
      status:         expected,
      actor:          fact.actor.clone(),
      reason:         decision.reason().map(str::to_owned),
      linked_tx_hash: Some(tx_hash.clone()),
    };

    let policy = self.config.store_retry();
    let mut attempt = 0;
    let outcome = loop {
      attempt += 1;
      match self
        .store_io(self.store.update_status(record_id, update.clone()))
        .await
      {
        Ok(found) => break Ok(found),
        Err(detail) if attempt < policy.max_attempts => {
          tracing::warn!(%record_id, attempt, %detail, "store update failed; retrying");
          state.retry_count += 1;
          tokio::time::sleep(policy.delay_after(attempt)).await;
        }
        Err(detail) => break Err(detail),
      }
    };

    match outcome {
      Ok(Some(record))
        if record.record_id == record_id
          && record.fact_id == fact.fact_id
          && record.status == expected
          && record.linked_tx_hash.as_deref() == Some(tx_hash.as_str()) =>
      {
        step(state, observe, |s| s.advance(SubmissionPhase::Reconciled));
      }
      Ok(Some(record)) => {
        tracing::error!(
          %record_id,
          tx = %receipt.tx,
          linked = ?record.linked_tx_hash,
          status = %record.status,
          "store acknowledged an update that does not match the ledger; manual reconciliation required"
        );
        step(state, observe, |s| {
          s.fail(
            ErrorKind::CrossReferenceMismatch,
            format!("record {record_id} does not reference {tx_hash}"),
          )
        });
      }
      Ok(None) => {
        tracing::error!(%record_id, tx = %receipt.tx, "record vanished after ledger confirmation; manual reconciliation required");
        step(state, observe, |s| {
          s.fail(ErrorKind::StoreUpdate, format!("record {record_id} not found"))
        });
      }
      Err(detail) => {
        tracing::error!(%record_id, tx = %receipt.tx, %detail, "ledger fact is final but store update failed; manual reconciliation required");
        step(state, observe, |s| s.fail(ErrorKind::StoreUpdate, detail));
      }
    }
  }

  /// Mark the record `Rejected`. Failure leaves it `Pending`, which the
  /// stuck-submission query surfaces.
  async fn write_rejection(
    &self,
    fact: &Fact,
    record_id: RecordId,
    reason: String,
    linked_tx_hash: Option<String>,
  ) {
    let update = StatusUpdate {
      status:         RecordStatus::Rejected,
      actor:          fact.actor.clone(),
      reason:         Some(reason),
      linked_tx_hash,
    };
    match self.store_io(self.store.update_status(record_id, update)).await {
      Ok(Some(_)) => {}
      Ok(None) => {
        tracing::error!(%record_id, "record vanished before rejection could be written");
      }
      Err(detail) => {
        tracing::error!(%record_id, %detail, "failed to mark record rejected");
      }
    }
  }

  /// Bound a store call by the configured timeout, flattening its error.
  async fn store_io<T, Fut>(&self, call: Fut) -> Result<T, String>
  where
    Fut: Future<Output = Result<T, M::Error>>,
  {
    match tokio::time::timeout(self.config.store_timeout(), call).await {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(e)) => Err(e.to_string()),
      Err(_) => Err(format!(
        "store call timed out after {:?}",
        self.config.store_timeout()
      )),
    }
  }

  // ── Manual reconciliation ───────────────────────────────────────────────

  /// Copy the confirmed ledger verdict into record `record_id`.
  ///
  /// For records left behind by a failed post-confirmation update. Only a
  /// ledger fact carrying the record's own `fact_id` is ever copied.
  pub async fn reconcile(&self, record_id: RecordId) -> Result<ReconcileOutcome> {
    let record = self
      .store
      .get(record_id)
      .await
      .map_err(|e| Error::Store(Box::new(e)))?
      .ok_or(Error::RecordNotFound(record_id))?;

    let read = self
      .ledger
      .read_fact(record.fact_type, &record.subject)
      .await;
    let ledger_fact = match read {
      Ok(f) => f,
      Err(LedgerError::NotFound) => {
        return Ok(ReconcileOutcome::LedgerUnconfirmed(record));
      }
      Err(e) => return Err(e.into()),
    };

    if !ledger_fact.confirmed {
      return Ok(ReconcileOutcome::LedgerUnconfirmed(record));
    }
    if ledger_fact.fact_id != record.fact_id {
      return Ok(ReconcileOutcome::Superseded(record));
    }

    let decision = ledger_fact.payload.decision();
    let tx_hash = ledger_fact.tx.tx_hash();
    if record.status == decision.record_status()
      && record.linked_tx_hash.as_deref() == Some(tx_hash)
    {
      return Ok(ReconcileOutcome::AlreadyConsistent(record));
    }

    let update = StatusUpdate {
      status:         decision.record_status(),
      actor:          record.actor.clone(),
      reason:         decision.reason().map(str::to_owned),
      linked_tx_hash: Some(tx_hash.to_owned()),
    };
    let repaired = self
      .store
      .update_status(record_id, update)
      .await
      .map_err(|e| Error::Store(Box::new(e)))?
      .ok_or(Error::RecordNotFound(record_id))?;

    tracing::info!(%record_id, tx = %ledger_fact.tx, status = %repaired.status, "record reconciled with ledger");
    if record.fact_type == FactType::RoleAssignment {
      self.invalidate_role(&record.subject);
    }
    Ok(ReconcileOutcome::Repaired(repaired))
  }
}

impl<L, M> FactCoordinator<L, M> {
  /// Drop `subject` from the attached role cache, if any.
  pub(crate) fn invalidate_role(&self, subject: &Address) {
    if let Some(roles) = &self.roles {
      roles.invalidate(subject);
    }
  }
}

/// Apply a transition and publish it. A refused transition is a coordinator
/// bug, not a submission failure, so it is logged and the state left as is.
fn step<F>(
  state: &mut SubmissionState,
  observe: &mut F,
  transition: impl FnOnce(&mut SubmissionState) -> Result<()>,
) where
  F: FnMut(&SubmissionState),
{
  match transition(state) {
    Ok(()) => observe(state),
    Err(e) => tracing::error!(fact_id = %state.fact_id, error = %e, "refused submission transition"),
  }
}
