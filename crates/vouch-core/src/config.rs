//! Tunables for the coordinator, workflow and role cache.
//!
//! Deserialised from the `[coordinator]` table of the server configuration;
//! every field has a default so the table may be omitted entirely.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ledger::ConfirmationPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
  /// Total ledger submission attempts, including the first.
  pub ledger_max_attempts:       u32,
  /// Backoff before the first ledger retry; doubled for each further retry.
  pub ledger_backoff_ms:         u64,
  pub min_confirmations:         u64,
  /// Upper bound on waiting for a receipt. Roughly block time × confirmations
  /// with generous headroom.
  pub confirmation_timeout_secs: u64,
  pub poll_initial_ms:           u64,
  pub poll_max_ms:               u64,
  /// Total attempts for the post-confirmation store update.
  pub store_max_attempts:        u32,
  pub store_backoff_ms:          u64,
  /// Per-call bound on store I/O.
  pub store_timeout_secs:        u64,
  /// Upper bound on one whole submission, after which the workflow records
  /// it as failed and releases the subject.
  pub workflow_timeout_secs:     u64,
  pub role_ttl_secs:             u64,
}

impl Default for CoordinatorConfig {
  fn default() -> Self {
    Self {
      ledger_max_attempts:       3,
      ledger_backoff_ms:         500,
      min_confirmations:         2,
      confirmation_timeout_secs: 300,
      poll_initial_ms:           1_000,
      poll_max_ms:               15_000,
      store_max_attempts:        3,
      store_backoff_ms:          200,
      store_timeout_secs:        5,
      workflow_timeout_secs:     600,
      role_ttl_secs:             60,
    }
  }
}

impl CoordinatorConfig {
  pub fn confirmation_policy(&self) -> ConfirmationPolicy {
    ConfirmationPolicy {
      min_confirmations: self.min_confirmations,
      timeout:           Duration::from_secs(self.confirmation_timeout_secs),
      initial_poll:      Duration::from_millis(self.poll_initial_ms),
      max_poll:          Duration::from_millis(self.poll_max_ms),
    }
  }

  pub fn ledger_retry(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.ledger_max_attempts.max(1),
      base_delay:   Duration::from_millis(self.ledger_backoff_ms),
    }
  }

  pub fn store_retry(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.store_max_attempts.max(1),
      base_delay:   Duration::from_millis(self.store_backoff_ms),
    }
  }

  pub fn store_timeout(&self) -> Duration {
    Duration::from_secs(self.store_timeout_secs)
  }

  pub fn workflow_timeout(&self) -> Duration {
    Duration::from_secs(self.workflow_timeout_secs)
  }

  pub fn role_ttl(&self) -> Duration { Duration::from_secs(self.role_ttl_secs) }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_delay:   Duration,
}

impl RetryPolicy {
  /// Delay to wait after failed attempt number `attempt` (1-based).
  pub fn delay_after(&self, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    self.base_delay.saturating_mul(1 << exp)
  }
}
