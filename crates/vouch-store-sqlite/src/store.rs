//! [`SqliteStore`] — the SQLite implementation of [`MetadataStore`].

use std::path::Path;

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::OptionalExtension as _;
use vouch_core::{
  address::Address,
  fact::FactType,
  record::{NewRecord, Record, RecordId, RecordStatus, StatusUpdate},
  store::MetadataStore,
};

use crate::{
  Error, Result,
  encode::{RECORD_COLUMNS, RawRecord, encode_dt, encode_payload, encode_uuid},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Vouch metadata store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a `SELECT {RECORD_COLUMNS} FROM records {tail}` query.
  async fn select_records(
    &self,
    tail: &'static str,
    params: Vec<String>,
  ) -> Result<Vec<Record>> {
    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records {tail}");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }
}

// ─── MetadataStore impl ──────────────────────────────────────────────────────

impl MetadataStore for SqliteStore {
  type Error = Error;

  async fn create(&self, input: NewRecord) -> Result<Record> {
    // Columns hold microseconds; keep the returned record identical to a
    // later read.
    let now = Utc::now().trunc_subsecs(6);
    let record = Record {
      record_id:      RecordId::new(),
      fact_id:        input.fact_id,
      subject:        input.subject,
      fact_type:      input.fact_type,
      status:         RecordStatus::Pending,
      linked_tx_hash: None,
      actor:          input.actor,
      reason:         None,
      payload:        input.payload,
      created_at:     now,
      updated_at:     now,
    };

    let record_id_str = encode_uuid(record.record_id.0);
    let fact_id_str   = encode_uuid(record.fact_id);
    let subject_str   = record.subject.as_str().to_owned();
    let fact_type     = record.fact_type.as_str();
    let status        = record.status.as_str();
    let actor_str     = record.actor.as_ref().map(|a| a.as_str().to_owned());
    let payload_str   = encode_payload(&record.payload)?;
    let at_str        = encode_dt(now);

    let inserted = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO records (
             record_id, fact_id, subject, fact_type, status,
             linked_tx_hash, actor, reason, payload_json,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, NULL, ?7, ?8, ?8)",
          rusqlite::params![
            record_id_str,
            fact_id_str,
            subject_str,
            fact_type,
            status,
            actor_str,
            payload_str,
            at_str,
          ],
        );
        match result {
          Ok(_) => Ok(true),
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
          {
            Ok(false)
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if !inserted {
      return Err(Error::DuplicateFact(record.fact_id));
    }
    Ok(record)
  }

  async fn update_status(
    &self,
    id: RecordId,
    update: StatusUpdate,
  ) -> Result<Option<Record>> {
    let id_str    = encode_uuid(id.0);
    let status    = update.status.as_str();
    let actor_str = update.actor.as_ref().map(|a| a.as_str().to_owned());
    let reason    = update.reason;
    let tx_hash   = update.linked_tx_hash;
    let at_str    = encode_dt(Utc::now());

    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE records
           SET status = ?2,
               actor = ?3,
               reason = ?4,
               linked_tx_hash = COALESCE(?5, linked_tx_hash),
               updated_at = ?6
           WHERE record_id = ?1",
          rusqlite::params![id_str, status, actor_str, reason, tx_hash, at_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        let raw = tx
          .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM records WHERE record_id = ?1"),
            rusqlite::params![id_str],
            RawRecord::from_row,
          )
          .optional()?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }

  async fn get(&self, id: RecordId) -> Result<Option<Record>> {
    let id_str = encode_uuid(id.0);

    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM records WHERE record_id = ?1"),
            rusqlite::params![id_str],
            RawRecord::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }

  async fn find(
    &self,
    subject: &Address,
    fact_type: FactType,
  ) -> Result<Vec<Record>> {
    self
      .select_records(
        "WHERE subject = ?1 AND fact_type = ?2
         ORDER BY created_at DESC, rowid DESC",
        vec![subject.as_str().to_owned(), fact_type.as_str().to_owned()],
      )
      .await
  }

  async fn find_stale_pending(
    &self,
    older_than: DateTime<Utc>,
  ) -> Result<Vec<Record>> {
    self
      .select_records(
        "WHERE status = ?1 AND created_at < ?2
         ORDER BY created_at ASC, rowid ASC",
        vec![
          RecordStatus::Pending.as_str().to_owned(),
          encode_dt(older_than),
        ],
      )
      .await
  }
}
