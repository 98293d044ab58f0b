//! [`VerificationWorkflow`] — single-writer lifecycle of verifiable
//! submissions.
//!
//! At most one submission per `(subject, fact_type)` is in flight at any
//! time. `begin` takes the key's lock, hands a fresh [`Fact`] to the
//! [`FactCoordinator`] on a spawned task, and the lock is released when that
//! task ends. Dropping the future returned by `begin` does not cancel the
//! submission; it keeps running and its progress stays queryable here.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use serde::Serialize;
use tokio::{sync::broadcast, task::JoinHandle};
use uuid::Uuid;

use crate::{
  Error, Result,
  address::Address,
  coordinator::{FactCoordinator, ReconcileOutcome},
  fact::{Fact, FactPayload, FactType},
  ledger::LedgerClient,
  merger::{MergedStatus, ResolvedStatus, StatusMerger},
  record::{Record, RecordId},
  store::MetadataStore,
  submission::{ErrorKind, SubmissionPhase, SubmissionState},
};

/// Lock and history key.
pub type SubjectKey = (Address, FactType);

const EVENT_CAPACITY: usize = 256;

/// Merged status overlaid with what the workflow knows about the latest
/// submission.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
  pub merged:    MergedStatus,
  pub latest:    Option<SubmissionState>,
  /// `merged.resolved_status`, except that a failed latest submission shows
  /// as `Failed` rather than `Pending`, and an in-flight one as `Pending`.
  pub effective: ResolvedStatus,
}

struct Inner<L, M> {
  coordinator: Arc<FactCoordinator<L, M>>,
  merger:      StatusMerger<L, M>,
  locks:       DashMap<SubjectKey, Uuid>,
  submissions: DashMap<Uuid, SubmissionState>,
  history:     DashMap<SubjectKey, Vec<Uuid>>,
  events:      broadcast::Sender<SubmissionState>,
  timeout:     Duration,
}

impl<L, M> Inner<L, M> {
  /// Store `state` as the latest snapshot of its submission and publish it.
  /// Snapshots of a submission that already reached a terminal state are
  /// discarded.
  ///
  /// A terminal snapshot frees the `(subject, fact_type)` key first, so no
  /// observer of the terminal state can be refused a new submission.
  fn record(&self, state: SubmissionState) {
    if state.is_terminal() {
      self.release(&state);
    }
    match self.submissions.entry(state.fact_id) {
      Entry::Occupied(mut e) => {
        if e.get().is_terminal() {
          tracing::warn!(
            fact_id = %state.fact_id,
            current = %e.get().state,
            attempted = %state.state,
            "ignoring update to terminal submission"
          );
          return;
        }
        e.insert(state.clone());
      }
      Entry::Vacant(e) => {
        self
          .history
          .entry((state.subject.clone(), state.fact_type))
          .or_default()
          .push(state.fact_id);
        e.insert(state.clone());
      }
    }
    // No subscribers is fine.
    let _ = self.events.send(state);
  }

  fn release(&self, state: &SubmissionState) {
    self.locks.remove_if(
      &(state.subject.clone(), state.fact_type),
      |_, holder| *holder == state.fact_id,
    );
  }

  fn snapshot(&self, fact_id: Uuid) -> Option<SubmissionState> {
    self.submissions.get(&fact_id).map(|s| s.value().clone())
  }

  /// Force a non-terminal submission into `Failed`.
  fn abandon(&self, fact_id: Uuid, kind: ErrorKind, detail: &str) {
    if let Some(mut state) = self.snapshot(fact_id)
      && !state.is_terminal()
      && state.fail(kind, detail).is_ok()
    {
      tracing::warn!(%fact_id, ?kind, detail, "submission abandoned");
      if state.fact_type == FactType::RoleAssignment {
        self.coordinator.invalidate_role(&state.subject);
      }
      self.record(state);
    }
  }
}

/// Holds the `(subject, fact_type)` lock for one submission.
///
/// The key is normally freed when the terminal state is recorded. Dropping
/// the guard covers the abort path: if the task ended (or panicked) before a
/// terminal state, the submission is failed and the key freed.
struct LockGuard<L, M> {
  inner:   Arc<Inner<L, M>>,
  key:     SubjectKey,
  fact_id: Uuid,
}

impl<L, M> Drop for LockGuard<L, M> {
  fn drop(&mut self) {
    self.inner.abandon(
      self.fact_id,
      ErrorKind::Aborted,
      "submission task ended before a terminal state",
    );
    self
      .inner
      .locks
      .remove_if(&self.key, |_, holder| *holder == self.fact_id);
  }
}

pub struct VerificationWorkflow<L, M> {
  inner: Arc<Inner<L, M>>,
}

impl<L, M> Clone for VerificationWorkflow<L, M> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<L, M> VerificationWorkflow<L, M>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  pub fn new(coordinator: FactCoordinator<L, M>) -> Self {
    let timeout = coordinator.config().workflow_timeout();
    let merger = StatusMerger::new(
      coordinator.ledger().clone(),
      coordinator.store().clone(),
    );
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      inner: Arc::new(Inner {
        coordinator: Arc::new(coordinator),
        merger,
        locks: DashMap::new(),
        submissions: DashMap::new(),
        history: DashMap::new(),
        events,
        timeout,
      }),
    }
  }

  pub fn coordinator(&self) -> &Arc<FactCoordinator<L, M>> {
    &self.inner.coordinator
  }

  pub fn merger(&self) -> &StatusMerger<L, M> { &self.inner.merger }

  // ── Submissions ─────────────────────────────────────────────────────────

  /// Submit `payload` for `subject` and wait for a terminal state.
  ///
  /// Returns [`Error::AlreadyInFlight`] if another submission holds the
  /// `(subject, fact_type)` lock. Every other outcome, including failure, is
  /// an `Ok` [`SubmissionState`].
  pub async fn begin(
    &self,
    subject: Address,
    payload: FactPayload,
    actor: Option<Address>,
  ) -> Result<SubmissionState> {
    let (initial, handle) = self.spawn(subject, payload, actor)?;
    match handle.await {
      Ok(state) => Ok(state),
      Err(e) => {
        tracing::error!(fact_id = %initial.fact_id, error = %e, "submission task failed");
        Err(Error::Task(e.to_string()))
      }
    }
  }

  /// Start a submission and return its initial `Submitted` state without
  /// waiting. Progress is available through [`submission`](Self::submission)
  /// and [`subscribe`](Self::subscribe).
  pub fn begin_detached(
    &self,
    subject: Address,
    payload: FactPayload,
    actor: Option<Address>,
  ) -> Result<SubmissionState> {
    let (initial, _handle) = self.spawn(subject, payload, actor)?;
    Ok(initial)
  }

  fn spawn(
    &self,
    subject: Address,
    payload: FactPayload,
    actor: Option<Address>,
  ) -> Result<(SubmissionState, JoinHandle<SubmissionState>)> {
    let fact = Fact::new(subject, payload, actor);
    let key: SubjectKey = (fact.subject.clone(), fact.fact_type);

    let guard = match self.inner.locks.entry(key.clone()) {
      Entry::Occupied(e) => {
        tracing::info!(
          subject = %fact.subject,
          fact_type = %fact.fact_type,
          holder = %e.get(),
          "submission rejected: already in flight"
        );
        return Err(Error::AlreadyInFlight {
          subject:   fact.subject,
          fact_type: fact.fact_type,
          fact_id:   *e.get(),
        });
      }
      Entry::Vacant(e) => {
        e.insert(fact.fact_id);
        LockGuard { inner: self.inner.clone(), key, fact_id: fact.fact_id }
      }
    };

    let initial = SubmissionState::new(&fact);
    self.inner.record(initial.clone());
    tracing::info!(
      fact_id = %fact.fact_id,
      subject = %fact.subject,
      fact_type = %fact.fact_type,
      "submission started"
    );

    let inner = self.inner.clone();
    let handle = tokio::spawn(async move {
      let _guard = guard;
      let observer = inner.clone();
      let run = inner
        .coordinator
        .submit_observed(&fact, move |s| observer.record(s.clone()));

      match tokio::time::timeout(inner.timeout, run).await {
        Ok(state) => state,
        Err(_) => {
          inner.abandon(
            fact.fact_id,
            ErrorKind::WorkflowTimeout,
            &format!("no terminal state within {:?}", inner.timeout),
          );
          inner
            .snapshot(fact.fact_id)
            .unwrap_or_else(|| SubmissionState::new(&fact))
        }
      }
    });

    Ok((initial, handle))
  }

  // ── Queries ─────────────────────────────────────────────────────────────

  /// Latest snapshot of one submission.
  pub fn submission(&self, fact_id: Uuid) -> Option<SubmissionState> {
    self.inner.snapshot(fact_id)
  }

  /// Every submission for `(subject, fact_type)`, oldest first. Superseded
  /// submissions are kept for audit.
  pub fn history(
    &self,
    subject: &Address,
    fact_type: FactType,
  ) -> Vec<SubmissionState> {
    let ids = self
      .inner
      .history
      .get(&(subject.clone(), fact_type))
      .map(|ids| ids.value().clone())
      .unwrap_or_default();
    ids.into_iter().filter_map(|id| self.inner.snapshot(id)).collect()
  }

  /// The most recent submission for `(subject, fact_type)`.
  pub fn current(
    &self,
    subject: &Address,
    fact_type: FactType,
  ) -> Option<SubmissionState> {
    self.history(subject, fact_type).pop()
  }

  /// Submissions that have not reached a terminal state.
  pub fn in_flight(&self) -> Vec<SubmissionState> {
    self
      .inner
      .submissions
      .iter()
      .filter(|s| !s.is_terminal())
      .map(|s| s.value().clone())
      .collect()
  }

  /// Every known submission, in no particular order.
  pub fn all(&self) -> Vec<SubmissionState> {
    self.inner.submissions.iter().map(|s| s.value().clone()).collect()
  }

  /// Stream of every state change from now on.
  pub fn subscribe(&self) -> broadcast::Receiver<SubmissionState> {
    self.inner.events.subscribe()
  }

  /// Wait until submission `fact_id` is terminal. `None` for an unknown id.
  pub async fn wait(&self, fact_id: Uuid) -> Option<SubmissionState> {
    // Subscribe before the first snapshot so no transition slips between.
    let mut events = self.subscribe();
    loop {
      let current = self.inner.snapshot(fact_id)?;
      if current.is_terminal() {
        return Some(current);
      }
      match events.recv().await {
        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        Err(broadcast::error::RecvError::Closed) => {
          return self.inner.snapshot(fact_id);
        }
      }
    }
  }

  /// Merged status for `(subject, fact_type)`, overlaid with the latest
  /// submission.
  pub async fn status(
    &self,
    subject: &Address,
    fact_type: FactType,
  ) -> Result<WorkflowStatus> {
    let merged = self.inner.merger.resolve(subject, fact_type).await?;
    let latest = self.current(subject, fact_type);

    let effective = match &latest {
      Some(s)
        if s.state == SubmissionPhase::Failed
          && matches!(
            merged.resolved_status,
            ResolvedStatus::Pending | ResolvedStatus::Unverified
          ) =>
      {
        ResolvedStatus::Failed
      }
      Some(s)
        if !s.is_terminal()
          && merged.resolved_status == ResolvedStatus::Unverified =>
      {
        ResolvedStatus::Pending
      }
      _ => merged.resolved_status,
    };

    Ok(WorkflowStatus { merged, latest, effective })
  }

  // ── Operator tooling ────────────────────────────────────────────────────

  /// `Pending` records created before `older_than`.
  pub async fn stuck_records(
    &self,
    older_than: DateTime<Utc>,
  ) -> Result<Vec<Record>> {
    self
      .inner
      .coordinator
      .store()
      .find_stale_pending(older_than)
      .await
      .map_err(|e| Error::Store(Box::new(e)))
  }

  /// See [`FactCoordinator::reconcile`].
  pub async fn reconcile(&self, record_id: RecordId) -> Result<ReconcileOutcome> {
    self.inner.coordinator.reconcile(record_id).await
  }
}
