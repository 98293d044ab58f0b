//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// Another submission holds the `(subject, fact_type)` lock.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  /// Ledger or store could not be reached.
  #[error("unavailable: {0}")]
  Unavailable(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<vouch_core::Error> for ApiError {
  fn from(e: vouch_core::Error) -> Self {
    use vouch_core::Error as E;
    match e {
      E::InvalidAddress(_)
      | E::UnknownFactType(_)
      | E::UnknownRecordStatus(_)
      | E::UnknownRole(_) => Self::BadRequest(e.to_string()),
      E::AlreadyInFlight { .. } => Self::Conflict(e.to_string()),
      E::Unauthorized { .. } => Self::Forbidden(e.to_string()),
      E::RecordNotFound(_) => Self::NotFound(e.to_string()),
      E::SourcesUnavailable { .. } | E::Ledger(_) => {
        Self::Unavailable(e.to_string())
      }
      other => Self::Internal(Box::new(other)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

/// Parse an address taken from a path or body.
pub(crate) fn parse_address(s: &str) -> Result<vouch_core::Address, ApiError> {
  Ok(vouch_core::Address::parse(s)?)
}
