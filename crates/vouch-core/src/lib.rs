//! Core types, ports, and coordination logic for Vouch.
//!
//! Vouch keeps two independently failing systems in agreement: a ledger that
//! is authoritative for identity, roles, verification status and loan state,
//! and an off-chain metadata store that holds the richer, mutable records
//! describing the same facts. This crate owns the protocol between them and
//! has no HTTP or database dependencies.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod address;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fact;
pub mod ledger;
pub mod memory;
pub mod merger;
pub mod platform;
pub mod record;
pub mod role;
pub mod store;
pub mod submission;
pub mod workflow;

pub use address::Address;
pub use error::{Error, Result};
