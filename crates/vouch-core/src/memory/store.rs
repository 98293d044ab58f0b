//! [`MemoryStore`] — a `HashMap`-backed [`MetadataStore`].

use std::{
  collections::HashMap,
  sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
  address::Address,
  fact::FactType,
  record::{NewRecord, Record, RecordId, RecordStatus, StatusUpdate},
  store::MetadataStore,
};

#[derive(Debug, Error)]
pub enum MemoryStoreError {
  #[error("store unavailable")]
  Unavailable,

  #[error("injected failure: {0}")]
  Injected(&'static str),
}

#[derive(Debug, Default)]
struct State {
  records:      HashMap<RecordId, Record>,
  /// Creation order, used to break `created_at` ties.
  order:        Vec<RecordId>,
  fail_creates: u32,
  fail_updates: u32,
  unavailable:  bool,
  update_calls: u32,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  state: Mutex<State>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Fail the next `n` calls to `create`.
  pub fn fail_next_creates(&self, n: u32) { self.lock().fail_creates = n; }

  /// Fail the next `n` calls to `update_status`.
  pub fn fail_next_updates(&self, n: u32) { self.lock().fail_updates = n; }

  /// While set, every operation fails with [`MemoryStoreError::Unavailable`].
  pub fn set_unavailable(&self, unavailable: bool) {
    self.lock().unavailable = unavailable;
  }

  pub fn len(&self) -> usize { self.lock().records.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Calls to `update_status`, including failed ones.
  pub fn update_calls(&self) -> u32 { self.lock().update_calls }

  /// Every record, oldest first.
  pub fn records(&self) -> Vec<Record> {
    let state = self.lock();
    state
      .order
      .iter()
      .filter_map(|id| state.records.get(id).cloned())
      .collect()
  }

  /// Write `record` as-is, bypassing the coordinator. Test setup only; lets
  /// callers fabricate inconsistent or back-dated records.
  pub fn insert_raw(&self, record: Record) {
    let mut state = self.lock();
    if state.records.insert(record.record_id, record.clone()).is_none() {
      state.order.push(record.record_id);
    }
  }
}

impl MetadataStore for MemoryStore {
  type Error = MemoryStoreError;

  async fn create(&self, input: NewRecord) -> Result<Record, MemoryStoreError> {
    let mut state = self.lock();
    if state.unavailable {
      return Err(MemoryStoreError::Unavailable);
    }
    if state.fail_creates > 0 {
      state.fail_creates -= 1;
      return Err(MemoryStoreError::Injected("create"));
    }

    let now = Utc::now();
    let record = Record {
      record_id:      RecordId::new(),
      fact_id:        input.fact_id,
      subject:        input.subject,
      fact_type:      input.fact_type,
      status:         RecordStatus::Pending,
      linked_tx_hash: None,
      actor:          input.actor,
      reason:         None,
      payload:        input.payload,
      created_at:     now,
      updated_at:     now,
    };
    state.records.insert(record.record_id, record.clone());
    state.order.push(record.record_id);
    Ok(record)
  }

  async fn update_status(
    &self,
    id: RecordId,
    update: StatusUpdate,
  ) -> Result<Option<Record>, MemoryStoreError> {
    let mut state = self.lock();
    state.update_calls += 1;
    if state.unavailable {
      return Err(MemoryStoreError::Unavailable);
    }
    if state.fail_updates > 0 {
      state.fail_updates -= 1;
      return Err(MemoryStoreError::Injected("update"));
    }

    let Some(record) = state.records.get_mut(&id) else {
      return Ok(None);
    };
    record.status = update.status;
    record.actor = update.actor;
    record.reason = update.reason;
    if let Some(tx_hash) = update.linked_tx_hash {
      record.linked_tx_hash = Some(tx_hash);
    }
    record.updated_at = Utc::now();
    Ok(Some(record.clone()))
  }

  async fn get(&self, id: RecordId) -> Result<Option<Record>, MemoryStoreError> {
    let state = self.lock();
    if state.unavailable {
      return Err(MemoryStoreError::Unavailable);
    }
    Ok(state.records.get(&id).cloned())
  }

  async fn find(
    &self,
    subject: &Address,
    fact_type: FactType,
  ) -> Result<Vec<Record>, MemoryStoreError> {
    let state = self.lock();
    if state.unavailable {
      return Err(MemoryStoreError::Unavailable);
    }
    let mut found: Vec<(usize, &Record)> = state
      .order
      .iter()
      .enumerate()
      .filter_map(|(i, id)| state.records.get(id).map(|r| (i, r)))
      .filter(|(_, r)| &r.subject == subject && r.fact_type == fact_type)
      .collect();
    found.sort_by(|(ia, a), (ib, b)| {
      b.created_at.cmp(&a.created_at).then(ib.cmp(ia))
    });
    Ok(found.into_iter().map(|(_, r)| r.clone()).collect())
  }

  async fn find_stale_pending(
    &self,
    older_than: DateTime<Utc>,
  ) -> Result<Vec<Record>, MemoryStoreError> {
    let state = self.lock();
    if state.unavailable {
      return Err(MemoryStoreError::Unavailable);
    }
    let mut found: Vec<Record> = state
      .order
      .iter()
      .filter_map(|id| state.records.get(id))
      .filter(|r| r.status == RecordStatus::Pending && r.created_at < older_than)
      .cloned()
      .collect();
    // Stable, so insertion order breaks ties.
    found.sort_by_key(|r| r.created_at);
    Ok(found)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fact::{FactPayload, KycVerificationValue};

  fn input(subject: &Address) -> NewRecord {
    NewRecord {
      fact_id:   uuid::Uuid::new_v4(),
      subject:   subject.clone(),
      fact_type: FactType::KycVerification,
      payload:   FactPayload::KycVerification(KycVerificationValue {
        approved: true,
        reason:   None,
      }),
      actor:     None,
    }
  }

  #[tokio::test]
  async fn find_returns_newest_first() {
    let store = MemoryStore::new();
    let subject = Address::parse("0x4444444444444444444444444444444444444444").unwrap();
    let first = store.create(input(&subject)).await.unwrap();
    let second = store.create(input(&subject)).await.unwrap();

    let found = store.find(&subject, FactType::KycVerification).await.unwrap();
    let ids: Vec<_> = found.iter().map(|r| r.record_id).collect();
    assert_eq!(ids, vec![second.record_id, first.record_id]);
    assert!(
      store
        .find(&subject, FactType::LoanDecision)
        .await
        .unwrap()
        .is_empty()
    );
  }

  #[tokio::test]
  async fn update_keeps_tx_hash_when_absent() {
    let store = MemoryStore::new();
    let subject = Address::parse("0x4444444444444444444444444444444444444444").unwrap();
    let record = store.create(input(&subject)).await.unwrap();

    store
      .update_status(record.record_id, StatusUpdate {
        status:         RecordStatus::Verified,
        actor:          None,
        reason:         None,
        linked_tx_hash: Some("0xabc".into()),
      })
      .await
      .unwrap();
    let updated = store
      .update_status(record.record_id, StatusUpdate {
        status:         RecordStatus::Rejected,
        actor:          None,
        reason:         Some("revoked".into()),
        linked_tx_hash: None,
      })
      .await
      .unwrap()
      .unwrap();

    assert_eq!(updated.status, RecordStatus::Rejected);
    assert_eq!(updated.linked_tx_hash.as_deref(), Some("0xabc"));
  }

  #[tokio::test]
  async fn injected_failures_are_consumed() {
    let store = MemoryStore::new();
    let subject = Address::parse("0x4444444444444444444444444444444444444444").unwrap();
    store.fail_next_creates(1);
    assert!(store.create(input(&subject)).await.is_err());
    assert!(store.create(input(&subject)).await.is_ok());
    assert_eq!(store.len(), 1);
  }
}
