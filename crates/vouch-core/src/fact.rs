//! Fact types — the unit of work submitted to the ledger.
//!
//! A fact is an immutable assertion about a subject. It is created once by the
//! verification workflow, written to the metadata store and the ledger, and
//! never modified afterwards. Corrections are new facts.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Error, Result, address::Address, record::RecordStatus};

// ─── Fact type ───────────────────────────────────────────────────────────────

/// The kind of assertion a fact makes. Locks, records and ledger reads are all
/// keyed by `(subject, fact_type)`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
  DocumentHash,
  RoleAssignment,
  KycVerification,
  LoanDecision,
}

impl FactType {
  pub const ALL: [FactType; 4] = [
    Self::DocumentHash,
    Self::RoleAssignment,
    Self::KycVerification,
    Self::LoanDecision,
  ];

  /// The discriminant string used in storage columns and URLs.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::DocumentHash => "document_hash",
      Self::RoleAssignment => "role_assignment",
      Self::KycVerification => "kyc_verification",
      Self::LoanDecision => "loan_decision",
    }
  }
}

impl fmt::Display for FactType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FactType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|t| t.as_str() == s)
      .ok_or_else(|| Error::UnknownFactType(s.to_owned()))
  }
}

// ─── Roles ───────────────────────────────────────────────────────────────────

/// A platform role as recorded on the ledger.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  /// No role fact has been confirmed for the subject.
  #[default]
  Unassigned,
  Borrower,
  Verifier,
  Lender,
  Admin,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Unassigned => "unassigned",
      Self::Borrower => "borrower",
      Self::Verifier => "verifier",
      Self::Lender => "lender",
      Self::Admin => "admin",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Role {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "unassigned" => Ok(Self::Unassigned),
      "borrower" => Ok(Self::Borrower),
      "verifier" => Ok(Self::Verifier),
      "lender" => Ok(Self::Lender),
      "admin" => Ok(Self::Admin),
      other => Err(Error::UnknownRole(other.to_owned())),
    }
  }
}

// ─── Payload sub-types ───────────────────────────────────────────────────────

/// The fingerprint of an uploaded document. Only the hash goes on-chain; the
/// document itself lives wherever the upload pipeline put it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHashValue {
  /// Caller-defined category, e.g. "passport" or "bank_statement".
  pub document_type: String,
  /// Lowercase hex SHA-256 of the document bytes.
  pub sha256:        String,
  /// Where the off-chain copy can be fetched, if anywhere.
  pub uri:           Option<String>,
}

impl DocumentHashValue {
  /// Fingerprint `contents` with SHA-256.
  pub fn from_bytes(document_type: impl Into<String>, contents: &[u8]) -> Self {
    Self {
      document_type: document_type.into(),
      sha256:        hex::encode(Sha256::digest(contents)),
      uri:           None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignmentValue {
  pub role: Role,
}

/// A verifier's decision on a subject's KYC package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycVerificationValue {
  pub approved: bool,
  pub reason:   Option<String>,
}

/// A lender's decision on one loan application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanDecisionValue {
  pub loan_id:  String,
  pub approved: bool,
  /// Principal in the smallest currency unit.
  pub amount:   Option<u64>,
  pub reason:   Option<String>,
}

// ─── Payload ─────────────────────────────────────────────────────────────────

/// The typed content of a fact. The variant determines the [`FactType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FactPayload {
  DocumentHash(DocumentHashValue),
  RoleAssignment(RoleAssignmentValue),
  KycVerification(KycVerificationValue),
  LoanDecision(LoanDecisionValue),
}

impl FactPayload {
  pub fn fact_type(&self) -> FactType {
    match self {
      Self::DocumentHash(_) => FactType::DocumentHash,
      Self::RoleAssignment(_) => FactType::RoleAssignment,
      Self::KycVerification(_) => FactType::KycVerification,
      Self::LoanDecision(_) => FactType::LoanDecision,
    }
  }

  /// The outcome the store record takes once the ledger confirms this
  /// payload. Document hashes and role grants verify on confirmation;
  /// decisions carry their own verdict.
  pub fn decision(&self) -> Decision {
    match self {
      Self::DocumentHash(_) | Self::RoleAssignment(_) => Decision::Approve,
      Self::KycVerification(v) => Decision::from_verdict(v.approved, &v.reason),
      Self::LoanDecision(v) => Decision::from_verdict(v.approved, &v.reason),
    }
  }
}

/// The verdict a confirmed payload carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
  Approve,
  Deny { reason: Option<String> },
}

impl Decision {
  fn from_verdict(approved: bool, reason: &Option<String>) -> Self {
    if approved {
      Self::Approve
    } else {
      Self::Deny { reason: reason.clone() }
    }
  }

  pub fn record_status(&self) -> RecordStatus {
    match self {
      Self::Approve => RecordStatus::Verified,
      Self::Deny { .. } => RecordStatus::Rejected,
    }
  }

  pub fn reason(&self) -> Option<&str> {
    match self {
      Self::Approve => None,
      Self::Deny { reason } => reason.as_deref(),
    }
  }
}

// ─── Fact ────────────────────────────────────────────────────────────────────

/// An immutable assertion about a subject, intended for the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
  /// Identifies this fact across both systems; the ledger deduplicates
  /// resubmissions on it.
  pub fact_id:      Uuid,
  pub fact_type:    FactType,
  pub subject:      Address,
  pub payload:      FactPayload,
  /// Who asserted the fact (the verifier, lender or admin), if not the
  /// subject themself.
  pub actor:        Option<Address>,
  pub submitted_at: DateTime<Utc>,
}

impl Fact {
  pub fn new(
    subject: Address,
    payload: FactPayload,
    actor: Option<Address>,
  ) -> Self {
    Self {
      fact_id: Uuid::new_v4(),
      fact_type: payload.fact_type(),
      subject,
      payload,
      actor,
      submitted_at: Utc::now(),
    }
  }
}
