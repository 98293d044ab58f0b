//! [`Platform`] — the capability set offered to callers.
//!
//! Operations are grouped by concern:
//!
//! | group | operations |
//! |-------|------------|
//! | [`RoleOps`] | `role_of`, `assign` (admin) |
//! | [`KycOps`] | `submit_document`, `verify` (verifier/admin), `status` |
//! | [`LoanOps`] | `decide` (lender/admin), `status` |
//! | [`AnalyticsOps`] | `summary`, `trust_score` |
//!
//! Every write goes through the [`VerificationWorkflow`], so the lock and
//! lifecycle rules apply uniformly. Writes return the initial
//! [`SubmissionState`] without waiting; use
//! [`VerificationWorkflow::wait`] or `subscribe` to follow them.

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;

use crate::{
  Error, Result,
  address::Address,
  config::CoordinatorConfig,
  coordinator::FactCoordinator,
  fact::{
    DocumentHashValue, FactPayload, FactType, KycVerificationValue,
    LoanDecisionValue, Role, RoleAssignmentValue,
  },
  ledger::LedgerClient,
  merger::MergedStatus,
  role::RoleCache,
  store::MetadataStore,
  submission::{SubmissionPhase, SubmissionState},
  workflow::{VerificationWorkflow, WorkflowStatus},
};

/// Computes a trust score from the merged view of every fact type for one
/// subject. The scoring model is supplied by the embedding application.
pub trait TrustScorer: Send + Sync {
  fn score(&self, subject: &Address, facts: &[MergedStatus]) -> f64;
}

pub struct Platform<L, M> {
  workflow: VerificationWorkflow<L, M>,
  roles:    Arc<RoleCache<L>>,
  scorer:   Option<Arc<dyn TrustScorer>>,
}

impl<L, M> Clone for Platform<L, M> {
  fn clone(&self) -> Self {
    Self {
      workflow: self.workflow.clone(),
      roles:    self.roles.clone(),
      scorer:   self.scorer.clone(),
    }
  }
}

impl<L, M> Platform<L, M>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  /// Wire a coordinator, role cache and workflow over `ledger` and `store`.
  pub fn new(ledger: Arc<L>, store: Arc<M>, config: CoordinatorConfig) -> Self {
    let roles = Arc::new(RoleCache::new(ledger.clone(), config.role_ttl()));
    let coordinator =
      FactCoordinator::new(ledger, store, config).with_role_cache(roles.clone());
    Self {
      workflow: VerificationWorkflow::new(coordinator),
      roles,
      scorer: None,
    }
  }

  pub fn with_trust_scorer(mut self, scorer: Arc<dyn TrustScorer>) -> Self {
    self.scorer = Some(scorer);
    self
  }

  pub fn workflow(&self) -> &VerificationWorkflow<L, M> { &self.workflow }

  pub fn role_cache(&self) -> &Arc<RoleCache<L>> { &self.roles }

  pub fn roles(&self) -> RoleOps<'_, L, M> { RoleOps { platform: self } }

  pub fn kyc(&self) -> KycOps<'_, L, M> { KycOps { platform: self } }

  pub fn loans(&self) -> LoanOps<'_, L, M> { LoanOps { platform: self } }

  pub fn analytics(&self) -> AnalyticsOps<'_, L, M> {
    AnalyticsOps { platform: self }
  }

  /// Fail with [`Error::Unauthorized`] unless `actor`'s confirmed role is one
  /// of `allowed`.
  async fn authorize(&self, actor: &Address, allowed: &[Role]) -> Result<()> {
    let held = self.roles.get_role(actor).await?;
    if allowed.contains(&held) {
      Ok(())
    } else {
      tracing::info!(%actor, %held, ?allowed, "operation refused");
      Err(Error::Unauthorized { actor: actor.clone(), held })
    }
  }
}

// ─── Roles ───────────────────────────────────────────────────────────────────

pub struct RoleOps<'a, L, M> {
  platform: &'a Platform<L, M>,
}

impl<L, M> RoleOps<'_, L, M>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  pub async fn role_of(&self, subject: &Address) -> Result<Role> {
    Ok(self.platform.roles.get_role(subject).await?)
  }

  pub async fn assign(
    &self,
    actor: &Address,
    subject: Address,
    role: Role,
  ) -> Result<SubmissionState> {
    self.platform.authorize(actor, &[Role::Admin]).await?;
    self.platform.workflow.begin_detached(
      subject,
      FactPayload::RoleAssignment(RoleAssignmentValue { role }),
      Some(actor.clone()),
    )
  }
}

// ─── KYC ─────────────────────────────────────────────────────────────────────

pub struct KycOps<'a, L, M> {
  platform: &'a Platform<L, M>,
}

impl<L, M> KycOps<'_, L, M>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  /// Anchor the hash of an identity document. The document itself never
  /// leaves the caller; only its SHA-256 and `uri` are recorded.
  pub fn submit_document(
    &self,
    subject: Address,
    document_type: &str,
    contents: &[u8],
    uri: Option<String>,
  ) -> Result<SubmissionState> {
    let mut value = DocumentHashValue::from_bytes(document_type, contents);
    value.uri = uri;
    let actor = subject.clone();
    self.platform.workflow.begin_detached(
      subject,
      FactPayload::DocumentHash(value),
      Some(actor),
    )
  }

  pub async fn verify(
    &self,
    actor: &Address,
    subject: Address,
    approved: bool,
    reason: Option<String>,
  ) -> Result<SubmissionState> {
    self
      .platform
      .authorize(actor, &[Role::Verifier, Role::Admin])
      .await?;
    self.platform.workflow.begin_detached(
      subject,
      FactPayload::KycVerification(KycVerificationValue { approved, reason }),
      Some(actor.clone()),
    )
  }

  pub async fn status(&self, subject: &Address) -> Result<WorkflowStatus> {
    self
      .platform
      .workflow
      .status(subject, FactType::KycVerification)
      .await
  }
}

// ─── Loans ───────────────────────────────────────────────────────────────────

pub struct LoanOps<'a, L, M> {
  platform: &'a Platform<L, M>,
}

impl<L, M> LoanOps<'_, L, M>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  pub async fn decide(
    &self,
    actor: &Address,
    subject: Address,
    decision: LoanDecisionValue,
  ) -> Result<SubmissionState> {
    self
      .platform
      .authorize(actor, &[Role::Lender, Role::Admin])
      .await?;
    self.platform.workflow.begin_detached(
      subject,
      FactPayload::LoanDecision(decision),
      Some(actor.clone()),
    )
  }

  pub async fn status(&self, subject: &Address) -> Result<WorkflowStatus> {
    self
      .platform
      .workflow
      .status(subject, FactType::LoanDecision)
      .await
  }
}

// ─── Analytics ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
  pub total:     usize,
  pub in_flight: usize,
  /// Submissions per current phase.
  pub by_phase:  BTreeMap<String, usize>,
  /// `Failed` submissions, which need an operator.
  pub failed:    usize,
}

pub struct AnalyticsOps<'a, L, M> {
  platform: &'a Platform<L, M>,
}

impl<L, M> AnalyticsOps<'_, L, M>
where
  L: LedgerClient + 'static,
  M: MetadataStore + 'static,
{
  /// Counts over every submission this process has seen.
  pub fn summary(&self) -> Summary {
    let all = self.platform.workflow.all();
    let mut by_phase = BTreeMap::new();
    for s in &all {
      *by_phase.entry(s.state.as_str().to_owned()).or_insert(0) += 1;
    }
    Summary {
      total: all.len(),
      in_flight: all.iter().filter(|s| !s.is_terminal()).count(),
      failed: all
        .iter()
        .filter(|s| s.state == SubmissionPhase::Failed)
        .count(),
      by_phase,
    }
  }

  /// `None` when no scorer is configured.
  pub async fn trust_score(&self, subject: &Address) -> Result<Option<f64>> {
    let Some(scorer) = &self.platform.scorer else {
      return Ok(None);
    };
    let merger = self.platform.workflow.merger();
    let mut facts = Vec::with_capacity(FactType::ALL.len());
    for fact_type in FactType::ALL {
      facts.push(merger.resolve(subject, fact_type).await?);
    }
    Ok(Some(scorer.score(subject, &facts)))
  }
}
