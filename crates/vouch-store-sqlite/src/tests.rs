//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use vouch_core::{
  address::Address,
  config::CoordinatorConfig,
  coordinator::FactCoordinator,
  fact::{DocumentHashValue, FactPayload, FactType, LoanDecisionValue},
  memory::MemoryLedger,
  record::{NewRecord, RecordId, RecordStatus, StatusUpdate},
  store::MetadataStore,
  submission::SubmissionPhase,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn subject() -> Address {
  Address::parse("0x0000000000000000000000000000000000000abc").unwrap()
}

fn document_record(subject: &Address) -> NewRecord {
  NewRecord {
    fact_id:   Uuid::new_v4(),
    subject:   subject.clone(),
    fact_type: FactType::DocumentHash,
    payload:   FactPayload::DocumentHash(DocumentHashValue::from_bytes(
      "passport", b"scan",
    )),
    actor:     Some(subject.clone()),
  }
}

fn verified(tx_hash: Option<&str>) -> StatusUpdate {
  StatusUpdate {
    status:         RecordStatus::Verified,
    actor:          None,
    reason:         None,
    linked_tx_hash: tx_hash.map(str::to_owned),
  }
}

// ─── Create / get ────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_record() {
  let s = store().await;
  let input = document_record(&subject());

  let created = s.create(input.clone()).await.unwrap();
  assert_eq!(created.status, RecordStatus::Pending);
  assert_eq!(created.fact_id, input.fact_id);
  assert!(created.linked_tx_hash.is_none());

  let fetched = s.get(created.record_id).await.unwrap().unwrap();
  assert_eq!(fetched, created);
}

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  assert!(s.get(RecordId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn second_record_for_same_fact_is_refused() {
  let s = store().await;
  let input = document_record(&subject());
  s.create(input.clone()).await.unwrap();

  let err = s.create(input.clone()).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateFact(id) if id == input.fact_id));
}

// ─── Updates ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_status_sets_fields() {
  let s = store().await;
  let lender = Address::parse("0x1111111111111111111111111111111111111111").unwrap();
  let created = s.create(document_record(&subject())).await.unwrap();

  let updated = s
    .update_status(created.record_id, StatusUpdate {
      status:         RecordStatus::Rejected,
      actor:          Some(lender.clone()),
      reason:         Some("blurry scan".into()),
      linked_tx_hash: Some("0xfeed".into()),
    })
    .await
    .unwrap()
    .unwrap();

  assert_eq!(updated.status, RecordStatus::Rejected);
  assert_eq!(updated.actor, Some(lender));
  assert_eq!(updated.reason.as_deref(), Some("blurry scan"));
  assert_eq!(updated.linked_tx_hash.as_deref(), Some("0xfeed"));
  assert!(updated.updated_at >= created.updated_at);
  assert_eq!(updated.created_at, created.created_at);
}

#[tokio::test]
async fn update_without_tx_hash_keeps_existing_link() {
  let s = store().await;
  let created = s.create(document_record(&subject())).await.unwrap();
  s.update_status(created.record_id, verified(Some("0xbeef")))
    .await
    .unwrap();

  let updated = s
    .update_status(created.record_id, verified(None))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.linked_tx_hash.as_deref(), Some("0xbeef"));
}

#[tokio::test]
async fn update_missing_returns_none() {
  let s = store().await;
  let result = s
    .update_status(RecordId::new(), verified(Some("0x1")))
    .await
    .unwrap();
  assert!(result.is_none());
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn find_returns_newest_first_and_filters() {
  let s = store().await;
  let subject = subject();
  let other = Address::parse("0x2222222222222222222222222222222222222222").unwrap();

  let first = s.create(document_record(&subject)).await.unwrap();
  let second = s.create(document_record(&subject)).await.unwrap();
  s.create(document_record(&other)).await.unwrap();

  let found = s.find(&subject, FactType::DocumentHash).await.unwrap();
  let ids: Vec<_> = found.iter().map(|r| r.record_id).collect();
  assert_eq!(ids, vec![second.record_id, first.record_id]);

  assert!(
    s.find(&subject, FactType::LoanDecision)
      .await
      .unwrap()
      .is_empty()
  );
}

#[tokio::test]
async fn stale_pending_excludes_settled_records() {
  let s = store().await;
  let subject = subject();
  let a = s.create(document_record(&subject)).await.unwrap();
  let b = s.create(document_record(&subject)).await.unwrap();
  let c = s.create(document_record(&subject)).await.unwrap();
  s.update_status(b.record_id, verified(Some("0xb"))).await.unwrap();

  let cutoff = Utc::now() + chrono::Duration::seconds(1);
  let stale = s.find_stale_pending(cutoff).await.unwrap();
  let ids: Vec<_> = stale.iter().map(|r| r.record_id).collect();
  assert_eq!(ids, vec![a.record_id, c.record_id]);

  let long_ago = Utc::now() - chrono::Duration::days(1);
  assert!(s.find_stale_pending(long_ago).await.unwrap().is_empty());
}

// ─── With the coordinator ────────────────────────────────────────────────────

#[tokio::test]
async fn coordinator_reconciles_through_sqlite() {
  let s = Arc::new(store().await);
  let ledger = Arc::new(MemoryLedger::new());
  let coordinator =
    FactCoordinator::new(ledger, s.clone(), CoordinatorConfig::default());

  let fact = vouch_core::fact::Fact::new(
    subject(),
    FactPayload::LoanDecision(LoanDecisionValue {
      loan_id:  "loan-1".into(),
      approved: true,
      amount:   Some(10_000),
      reason:   None,
    }),
    None,
  );
  let state = coordinator.submit(&fact).await;
  assert_eq!(state.state, SubmissionPhase::Reconciled);

  let record = s.get(state.record_id.unwrap()).await.unwrap().unwrap();
  assert_eq!(record.status, RecordStatus::Verified);
  assert_eq!(
    record.linked_tx_hash.as_deref(),
    state.tx_handle.as_ref().map(|t| t.tx_hash())
  );
}
