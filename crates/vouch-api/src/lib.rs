//! JSON REST API for Vouch.
//!
//! Exposes an axum [`Router`] backed by a [`Platform`] over any
//! [`LedgerClient`] and [`MetadataStore`]. Authentication, TLS and request
//! tracing are the caller's responsibility; callers identify themselves with
//! the `actor` field and are authorized by their on-chain role.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", vouch_api::api_router(platform.clone()))
//! ```

pub mod analytics;
pub mod error;
pub mod kyc;
pub mod loans;
pub mod records;
pub mod roles;
pub mod status;
pub mod submissions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use vouch_core::{ledger::LedgerClient, platform::Platform, store::MetadataStore};

pub use error::ApiError;

/// Build the API router for `platform`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<L, M>(platform: Arc<Platform<L, M>>) -> Router<()>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  Router::new()
    // Submissions
    .route(
      "/submissions",
      get(submissions::history::<L, M>).post(submissions::create::<L, M>),
    )
    .route("/submissions/in-flight", get(submissions::in_flight::<L, M>))
    .route("/submissions/{fact_id}", get(submissions::get_one::<L, M>))
    // Merged status
    .route("/status/{subject}/{fact_type}", get(status::handler::<L, M>))
    // Capabilities
    .route(
      "/roles/{subject}",
      get(roles::get_one::<L, M>).post(roles::assign::<L, M>),
    )
    .route("/kyc/{subject}", get(kyc::status::<L, M>))
    .route("/kyc/{subject}/documents", post(kyc::submit_document::<L, M>))
    .route("/kyc/{subject}/verification", post(kyc::verify::<L, M>))
    .route(
      "/loans/{subject}",
      get(loans::status::<L, M>).post(loans::decide::<L, M>),
    )
    .route("/analytics/summary", get(analytics::summary::<L, M>))
    .route("/analytics/trust/{subject}", get(analytics::trust::<L, M>))
    // Operator tooling
    .route("/records/stuck", get(records::stuck::<L, M>))
    .route("/records/{record_id}/reconcile", post(records::reconcile::<L, M>))
    .with_state(platform)
}

#[cfg(test)]
mod tests;
