//! Encoding and decoding helpers between Vouch domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that lexical order is chronological order. Payloads are stored as the
//! tagged JSON form of [`FactPayload`]. UUIDs are stored hyphenated.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;
use vouch_core::{
  address::Address,
  fact::{FactPayload, FactType},
  record::{Record, RecordId, RecordStatus},
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Payload ─────────────────────────────────────────────────────────────────

pub fn encode_payload(p: &FactPayload) -> Result<String> {
  Ok(serde_json::to_string(p)?)
}

pub fn decode_payload(s: &str) -> Result<FactPayload> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching the field order of [`RawRecord`].
pub const RECORD_COLUMNS: &str = "record_id, fact_id, subject, fact_type, \
                                  status, linked_tx_hash, actor, reason, \
                                  payload_json, created_at, updated_at";

/// Raw strings read directly from a `records` row.
pub struct RawRecord {
  pub record_id:      String,
  pub fact_id:        String,
  pub subject:        String,
  pub fact_type:      String,
  pub status:         String,
  pub linked_tx_hash: Option<String>,
  pub actor:          Option<String>,
  pub reason:         Option<String>,
  pub payload_json:   String,
  pub created_at:     String,
  pub updated_at:     String,
}

impl RawRecord {
  /// Map a row selected with [`RECORD_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:      row.get(0)?,
      fact_id:        row.get(1)?,
      subject:        row.get(2)?,
      fact_type:      row.get(3)?,
      status:         row.get(4)?,
      linked_tx_hash: row.get(5)?,
      actor:          row.get(6)?,
      reason:         row.get(7)?,
      payload_json:   row.get(8)?,
      created_at:     row.get(9)?,
      updated_at:     row.get(10)?,
    })
  }

  pub fn into_record(self) -> Result<Record> {
    let payload = decode_payload(&self.payload_json)?;
    let fact_type: FactType = self.fact_type.parse()?;
    if payload.fact_type() != fact_type {
      return Err(Error::Corrupt(format!(
        "record {} has fact_type {fact_type} but a {} payload",
        self.record_id,
        payload.fact_type()
      )));
    }

    Ok(Record {
      record_id: RecordId(decode_uuid(&self.record_id)?),
      fact_id: decode_uuid(&self.fact_id)?,
      subject: Address::parse(&self.subject)?,
      fact_type,
      status: self.status.parse::<RecordStatus>()?,
      linked_tx_hash: self.linked_tx_hash,
      actor: self.actor.as_deref().map(Address::parse).transpose()?,
      reason: self.reason,
      payload,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
