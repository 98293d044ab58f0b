//! [`RoleCache`] — short-lived memo of ledger role lookups.
//!
//! Every authorization check needs the caller's role, and the ledger is the
//! only authority for it. The cache keeps each answer for a bounded TTL and
//! is refreshed lazily on read. Role-changing submissions invalidate their
//! subject explicitly so a grant or revocation is visible on the next read.

use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::Instant;

use crate::{
  address::Address,
  fact::{FactPayload, FactType, Role},
  ledger::{LedgerClient, LedgerError},
};

#[derive(Debug, Default)]
struct Slot {
  cached:     Option<(Role, Instant)>,
  /// Bumped by every invalidation. A refresh only stores its result if the
  /// generation it started under is still current.
  generation: u64,
}

pub struct RoleCache<L> {
  ledger:  Arc<L>,
  ttl:     Duration,
  entries: DashMap<Address, Slot>,
}

impl<L> RoleCache<L> {
  /// Drop the cached role for `subject`. Any refresh already in flight for
  /// it will not repopulate the cache.
  pub fn invalidate(&self, subject: &Address) {
    tracing::debug!(%subject, "role cache invalidated");
    let mut slot = self.entries.entry(subject.clone()).or_default();
    slot.cached = None;
    slot.generation += 1;
  }
}

impl<L: LedgerClient> RoleCache<L> {
  pub fn new(ledger: Arc<L>, ttl: Duration) -> Self {
    Self { ledger, ttl, entries: DashMap::new() }
  }

  /// The confirmed on-chain role of `subject`.
  pub async fn get_role(&self, subject: &Address) -> Result<Role, LedgerError> {
    let generation = match self.entries.get(subject) {
      Some(slot) => {
        if let Some((role, cached_at)) = slot.cached
          && cached_at.elapsed() < self.ttl
        {
          return Ok(role);
        }
        slot.generation
      }
      None => 0,
    };

    let role = self.fetch(subject).await?;

    match self.entries.entry(subject.clone()) {
      Entry::Occupied(mut e) => {
        if e.get().generation == generation {
          e.get_mut().cached = Some((role, Instant::now()));
        }
      }
      Entry::Vacant(e) => {
        if generation == 0 {
          e.insert(Slot {
            cached:     Some((role, Instant::now())),
            generation: 0,
          });
        }
      }
    }

    Ok(role)
  }

  async fn fetch(&self, subject: &Address) -> Result<Role, LedgerError> {
    match self.ledger.read_fact(FactType::RoleAssignment, subject).await {
      Ok(fact) if fact.confirmed => match fact.payload {
        FactPayload::RoleAssignment(v) => Ok(v.role),
        other => {
          tracing::warn!(
            %subject,
            fact_type = %other.fact_type(),
            "ledger returned a non-role payload for a role lookup"
          );
          Ok(Role::Unassigned)
        }
      },
      Ok(_) | Err(LedgerError::NotFound) => Ok(Role::Unassigned),
      Err(e) => Err(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::{
    fact::RoleAssignmentValue,
    ledger::{LedgerFact, TxHandle},
    memory::MemoryLedger,
  };

  fn role(role: Role) -> FactPayload {
    FactPayload::RoleAssignment(RoleAssignmentValue { role })
  }

  fn subject() -> Address {
    Address::parse("0x5555555555555555555555555555555555555555").unwrap()
  }

  #[tokio::test(start_paused = true)]
  async fn cached_until_ttl_expires() {
    let ledger = Arc::new(MemoryLedger::new());
    let cache = RoleCache::new(ledger.clone(), Duration::from_secs(60));
    ledger.seed_confirmed(&subject(), role(Role::Borrower));

    assert_eq!(cache.get_role(&subject()).await.unwrap(), Role::Borrower);

    ledger.seed_confirmed(&subject(), role(Role::Lender));
    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(cache.get_role(&subject()).await.unwrap(), Role::Borrower);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get_role(&subject()).await.unwrap(), Role::Lender);
  }

  #[tokio::test(start_paused = true)]
  async fn invalidate_forces_a_fresh_read() {
    let ledger = Arc::new(MemoryLedger::new());
    let cache = RoleCache::new(ledger.clone(), Duration::from_secs(3_600));

    assert_eq!(cache.get_role(&subject()).await.unwrap(), Role::Unassigned);
    ledger.seed_confirmed(&subject(), role(Role::Verifier));
    assert_eq!(cache.get_role(&subject()).await.unwrap(), Role::Unassigned);

    cache.invalidate(&subject());
    assert_eq!(cache.get_role(&subject()).await.unwrap(), Role::Verifier);
  }

  #[tokio::test]
  async fn unconfirmed_role_is_not_granted() {
    let ledger = Arc::new(MemoryLedger::new());
    let cache = RoleCache::new(ledger.clone(), Duration::from_secs(60));
    ledger.seed_fact(LedgerFact {
      fact_id:     Uuid::new_v4(),
      fact_type:   FactType::RoleAssignment,
      subject:     subject(),
      payload:     role(Role::Admin),
      tx:          TxHandle::new("0x01"),
      confirmed:   false,
      recorded_at: Utc::now(),
    });

    assert_eq!(cache.get_role(&subject()).await.unwrap(), Role::Unassigned);
  }

  #[tokio::test]
  async fn ledger_errors_are_not_cached() {
    let ledger = Arc::new(MemoryLedger::new());
    let cache = RoleCache::new(ledger.clone(), Duration::from_secs(60));
    ledger.seed_confirmed(&subject(), role(Role::Lender));
    ledger.set_read_error(Some(LedgerError::Network("rpc down".into())));

    assert!(cache.get_role(&subject()).await.is_err());

    ledger.set_read_error(None);
    assert_eq!(cache.get_role(&subject()).await.unwrap(), Role::Lender);
  }
}
