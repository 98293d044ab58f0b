//! Handlers for `/loans` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/loans/{subject}` | Body: [`DecideBody`]; lender or admin |
//! | `GET`  | `/loans/{subject}` | Latest loan decision status |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use vouch_core::{
  fact::LoanDecisionValue, ledger::LedgerClient, platform::Platform,
  store::MetadataStore, workflow::WorkflowStatus,
};

use crate::error::{ApiError, parse_address};

#[derive(Debug, Deserialize)]
pub struct DecideBody {
  pub actor:    String,
  pub loan_id:  String,
  pub approved: bool,
  pub amount:   Option<u64>,
  pub reason:   Option<String>,
}

/// `POST /loans/{subject}`
pub async fn decide<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Path(subject): Path<String>,
  Json(body): Json<DecideBody>,
) -> Result<impl IntoResponse, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let subject = parse_address(&subject)?;
  let actor = parse_address(&body.actor)?;
  let decision = LoanDecisionValue {
    loan_id:  body.loan_id,
    approved: body.approved,
    amount:   body.amount,
    reason:   body.reason,
  };
  let state = platform.loans().decide(&actor, subject, decision).await?;
  Ok((StatusCode::ACCEPTED, Json(state)))
}

/// `GET /loans/{subject}`
pub async fn status<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Path(subject): Path<String>,
) -> Result<Json<WorkflowStatus>, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let subject = parse_address(&subject)?;
  Ok(Json(platform.loans().status(&subject).await?))
}
