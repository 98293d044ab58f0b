//! SQL schema for the Vouch SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per submitted fact. Only status, actor, reason, linked_tx_hash
-- and updated_at ever change after insert.
CREATE TABLE IF NOT EXISTS records (
    record_id      TEXT PRIMARY KEY,
    fact_id        TEXT NOT NULL UNIQUE,
    subject        TEXT NOT NULL,   -- lowercase 0x-prefixed address
    fact_type      TEXT NOT NULL,   -- 'document_hash' | 'role_assignment' | ...
    status         TEXT NOT NULL,   -- 'pending' | 'verified' | 'rejected'
    linked_tx_hash TEXT,
    actor          TEXT,
    reason         TEXT,
    payload_json   TEXT NOT NULL,   -- tagged FactPayload
    created_at     TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS records_subject_idx ON records(subject, fact_type);
CREATE INDEX IF NOT EXISTS records_status_idx  ON records(status, created_at);

PRAGMA user_version = 1;
";
