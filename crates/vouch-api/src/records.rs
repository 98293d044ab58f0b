//! Operator endpoints for records the coordinator could not settle.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/records/stuck` | `?older_than_secs=` (default 300); `Pending` records, oldest first |
//! | `POST` | `/records/{record_id}/reconcile` | Copy the confirmed ledger verdict into the record |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use vouch_core::{
  coordinator::ReconcileOutcome,
  ledger::LedgerClient,
  platform::Platform,
  record::{Record, RecordId},
  store::MetadataStore,
};

use crate::error::ApiError;

const DEFAULT_STUCK_AFTER_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct StuckParams {
  pub older_than_secs: Option<i64>,
}

/// `GET /records/stuck[?older_than_secs=<n>]`
pub async fn stuck<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Query(params): Query<StuckParams>,
) -> Result<Json<Vec<Record>>, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let secs = params.older_than_secs.unwrap_or(DEFAULT_STUCK_AFTER_SECS);
  if secs < 0 {
    return Err(ApiError::BadRequest("older_than_secs must not be negative".into()));
  }
  let cutoff = chrono::Duration::try_seconds(secs)
    .and_then(|age| Utc::now().checked_sub_signed(age))
    .ok_or_else(|| ApiError::BadRequest(format!("older_than_secs {secs} is out of range")))?;
  Ok(Json(platform.workflow().stuck_records(cutoff).await?))
}

/// `POST /records/{record_id}/reconcile`
pub async fn reconcile<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Path(record_id): Path<Uuid>,
) -> Result<Json<ReconcileOutcome>, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let outcome = platform.workflow().reconcile(RecordId(record_id)).await?;
  Ok(Json(outcome))
}
