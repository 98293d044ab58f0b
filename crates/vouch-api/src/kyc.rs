//! Handlers for `/kyc` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/kyc/{subject}/documents` | Body: [`DocumentBody`]; only the hash is anchored |
//! | `POST` | `/kyc/{subject}/verification` | Body: [`VerifyBody`]; verifier or admin |
//! | `GET`  | `/kyc/{subject}` | KYC verification status |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::Deserialize;
use vouch_core::{
  ledger::LedgerClient, platform::Platform, store::MetadataStore,
  workflow::WorkflowStatus,
};

use crate::error::{ApiError, parse_address};

#[derive(Debug, Deserialize)]
pub struct DocumentBody {
  pub document_type: String,
  /// Base64 of the document bytes. Hashed here and discarded.
  pub contents:      String,
  pub uri:           Option<String>,
}

/// `POST /kyc/{subject}/documents`
pub async fn submit_document<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Path(subject): Path<String>,
  Json(body): Json<DocumentBody>,
) -> Result<impl IntoResponse, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let subject = parse_address(&subject)?;
  let contents = B64
    .decode(body.contents.as_bytes())
    .map_err(|e| ApiError::BadRequest(format!("contents is not base64: {e}")))?;
  let state = platform.kyc().submit_document(
    subject,
    &body.document_type,
    &contents,
    body.uri,
  )?;
  Ok((StatusCode::ACCEPTED, Json(state)))
}

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
  pub actor:    String,
  pub approved: bool,
  pub reason:   Option<String>,
}

/// `POST /kyc/{subject}/verification`
pub async fn verify<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Path(subject): Path<String>,
  Json(body): Json<VerifyBody>,
) -> Result<impl IntoResponse, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let subject = parse_address(&subject)?;
  let actor = parse_address(&body.actor)?;
  let state = platform
    .kyc()
    .verify(&actor, subject, body.approved, body.reason)
    .await?;
  Ok((StatusCode::ACCEPTED, Json(state)))
}

/// `GET /kyc/{subject}`
pub async fn status<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Path(subject): Path<String>,
) -> Result<Json<WorkflowStatus>, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let subject = parse_address(&subject)?;
  Ok(Json(platform.kyc().status(&subject).await?))
}
