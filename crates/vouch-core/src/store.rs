//! The `MetadataStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `vouch-store-sqlite`,
//! or [`crate::memory::MemoryStore`]). The coordinator, merger and API layers
//! depend on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  address::Address,
  fact::FactType,
  record::{NewRecord, Record, RecordId, StatusUpdate},
};

/// Abstraction over the off-chain record store.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait MetadataStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new `Pending` record.
  fn create(
    &self,
    input: NewRecord,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Overwrite the status fields of a record. Returns `None` if `id` does not
  /// exist.
  fn update_status(
    &self,
    id: RecordId,
    update: StatusUpdate,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + '_;

  /// Retrieve a record by id. Returns `None` if not found.
  fn get(
    &self,
    id: RecordId,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + '_;

  /// All records for `(subject, fact_type)`, newest first.
  fn find<'a>(
    &'a self,
    subject: &'a Address,
    fact_type: FactType,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + 'a;

  /// `Pending` records created before `older_than`, oldest first. These are
  /// the stuck submissions operators need to look at.
  fn find_stale_pending(
    &self,
    older_than: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;
}
