//! Handler for `GET /status/{subject}/{fact_type}`.
//!
//! Returns the merged ledger/store view overlaid with the latest submission.
//! A ledger or store outage degrades the answer; only when both are down is
//! it a 503.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use vouch_core::{
  fact::FactType,
  ledger::LedgerClient,
  platform::Platform,
  store::MetadataStore,
  workflow::WorkflowStatus,
};

use crate::error::{ApiError, parse_address};

pub async fn handler<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Path((subject, fact_type)): Path<(String, String)>,
) -> Result<Json<WorkflowStatus>, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let subject = parse_address(&subject)?;
  let fact_type: FactType = fact_type.parse()?;
  let status = platform.workflow().status(&subject, fact_type).await?;
  Ok(Json(status))
}
