//! Handlers for `/submissions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/submissions` | Body: [`SubmitBody`]; 202 + initial state, 409 if in flight |
//! | `GET`  | `/submissions` | `?subject=&fact_type=`; every attempt, oldest first |
//! | `GET`  | `/submissions/in-flight` | Submissions not yet terminal |
//! | `GET`  | `/submissions/{fact_id}` | Latest state of one submission |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use vouch_core::{
  fact::{FactPayload, FactType},
  ledger::LedgerClient,
  platform::Platform,
  store::MetadataStore,
  submission::SubmissionState,
};

use crate::error::{ApiError, parse_address};

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
  pub subject: String,
  /// Tagged payload, e.g. `{"type":"document_hash","data":{...}}`. The fact
  /// type is taken from the tag.
  pub payload: FactPayload,
  pub actor:   Option<String>,
}

/// `POST /submissions`
pub async fn create<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Json(body): Json<SubmitBody>,
) -> Result<impl IntoResponse, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let subject = parse_address(&body.subject)?;
  let actor = body.actor.as_deref().map(parse_address).transpose()?;
  let state = platform
    .workflow()
    .begin_detached(subject, body.payload, actor)?;
  Ok((StatusCode::ACCEPTED, Json(state)))
}

// ─── History ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub subject:   String,
  pub fact_type: String,
}

/// `GET /submissions?subject=<address>&fact_type=<type>`
pub async fn history<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<SubmissionState>>, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let subject = parse_address(&params.subject)?;
  let fact_type: FactType = params.fact_type.parse()?;
  Ok(Json(platform.workflow().history(&subject, fact_type)))
}

/// `GET /submissions/in-flight`
pub async fn in_flight<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
) -> Json<Vec<SubmissionState>>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  Json(platform.workflow().in_flight())
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /submissions/{fact_id}`
pub async fn get_one<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Path(fact_id): Path<Uuid>,
) -> Result<Json<SubmissionState>, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  platform
    .workflow()
    .submission(fact_id)
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("submission {fact_id} not found")))
}
