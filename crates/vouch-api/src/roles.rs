//! Handlers for `/roles` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/roles/{subject}` | Confirmed role, via the role cache |
//! | `POST` | `/roles/{subject}` | Body: `{"actor":"0x…","role":"lender"}`; admin only |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use vouch_core::{
  Address, fact::Role, ledger::LedgerClient, platform::Platform,
  store::MetadataStore,
};

use crate::error::{ApiError, parse_address};

#[derive(Debug, Serialize)]
pub struct RoleView {
  pub subject: Address,
  pub role:    Role,
}

/// `GET /roles/{subject}`
pub async fn get_one<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Path(subject): Path<String>,
) -> Result<Json<RoleView>, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let subject = parse_address(&subject)?;
  let role = platform.roles().role_of(&subject).await?;
  Ok(Json(RoleView { subject, role }))
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
  pub actor: String,
  pub role:  Role,
}

/// `POST /roles/{subject}`
pub async fn assign<L, M>(
  State(platform): State<Arc<Platform<L, M>>>,
  Path(subject): Path<String>,
  Json(body): Json<AssignBody>,
) -> Result<impl IntoResponse, ApiError>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  let subject = parse_address(&subject)?;
  let actor = parse_address(&body.actor)?;
  let state = platform.roles().assign(&actor, subject, body.role).await?;
  Ok((StatusCode::ACCEPTED, Json(state)))
}
