//! In-process implementations of the two ports.
//!
//! [`MemoryLedger`] simulates a chain: transactions confirm (or revert) after
//! a configurable number of receipt polls, and failures can be scripted.
//! [`MemoryStore`] is a `HashMap`-backed metadata store with injectable
//! outages. Both back the development server and the test suites.

mod ledger;
mod store;

pub use ledger::{MemoryLedger, TxOutcome};
pub use store::{MemoryStore, MemoryStoreError};
