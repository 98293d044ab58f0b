//! Handlers for `/analytics` endpoints.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Serialize;
use vouch_core::{
  Address,
  ledger::LedgerClient,
  platform::{Platform, Summary},
  store::MetadataStore,
};

use crate::error::{ApiError, parse_address};

/// `GET /analytics/summary`
pub async fn summary<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
) -> Json<Summary>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  Json(platform.analytics().summary())
}

#[derive(Debug, Serialize)]
pub struct TrustView {
  pub subject: Address,
  /// `null` when no scorer is configured.
  pub score:   Option<f64>,
}

/// `GET /analytics/trust/{subject}`
pub async fn trust<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Path(subject): Path<String>,
) -> Result<Json<TrustView>, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let subject = parse_address(&subject)?;
  let score = platform.analytics().trust_score(&subject).await?;
  Ok(Json(TrustView { subject, score }))
}
