//! [`SqliteDocumentStore`] — the SQLite implementation of [`DocumentStore`],
//! one instance per document kind.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use ekam_core::{
  document::{DocumentRecord, NewDocument},
  identity::{DocumentKind, IdentityNumber},
  outcome::{ConflictInfo, InsertOutcome, StoreMetrics},
  store::DocumentStore,
};

use crate::{
  encode::{decode_dt, decode_uuid, encode_dt, encode_fields, encode_uuid, RawDocument},
  schema::DOCUMENTS_SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A per-kind document store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteDocumentStore {
  kind: DocumentKind,
  conn: tokio_rusqlite::Connection,
}

impl SqliteDocumentStore {
  /// Open (or create) the `kind` store at `path` and run schema
  /// initialisation, including the identity-number unique index.
  pub async fn open(kind: DocumentKind, path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { kind, conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory(kind: DocumentKind) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { kind, conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(DOCUMENTS_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Map one `documents` row (canonical column order) to [`RawDocument`].
fn map_document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDocument> {
  Ok(RawDocument {
    document_id:     row.get(0)?,
    identity_number: row.get(1)?,
    fields_json:     row.get(2)?,
    user_id:         row.get(3)?,
    ingested_at:     row.get(4)?,
  })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(err, _)
      if err.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteDocumentStore {
  type Error = Error;

  fn kind(&self) -> DocumentKind {
    self.kind
  }

  async fn insert_document(&self, input: NewDocument) -> Result<InsertOutcome> {
    let kind = self.kind;
    let number_str = input.identity_number.as_str().to_owned();
    let fields_str = encode_fields(&input.fields)?;
    let user_id_str = encode_uuid(input.user_id);
    let now_str = encode_dt(Utc::now());

    // The unique index arbitrates concurrent inserts of the same number.
    // On a constraint hit the winning row is re-read in the same call, so
    // the caller always gets usable conflict coordinates.
    let raw: std::result::Result<RawDocument, RawDocument> = self
      .conn
      .call(move |conn| {
        let inserted = conn.execute(
          "INSERT INTO documents (identity_number, fields_json, user_id, ingested_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![number_str, fields_str, user_id_str, now_str],
        );

        match inserted {
          Ok(_) => {
            let raw = conn.query_row(
              "SELECT document_id, identity_number, fields_json, user_id, ingested_at
               FROM documents WHERE document_id = last_insert_rowid()",
              [],
              map_document_row,
            )?;
            Ok(Ok(raw))
          }
          Err(e) if is_unique_violation(&e) => {
            let winner = conn.query_row(
              "SELECT document_id, identity_number, fields_json, user_id, ingested_at
               FROM documents WHERE identity_number = ?1",
              rusqlite::params![number_str],
              map_document_row,
            )?;
            Ok(Err(winner))
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    match raw {
      Ok(raw) => Ok(InsertOutcome::Inserted(raw.into_record(kind)?)),
      Err(winner) => Ok(InsertOutcome::Conflict(ConflictInfo {
        kind,
        user_id:     winner.user_id.as_deref().map(decode_uuid).transpose()?,
        document_id: Some(winner.document_id),
        ingested_at: decode_dt(&winner.ingested_at)?,
      })),
    }
  }

  async fn find_by_number(&self, number: &IdentityNumber) -> Result<Option<DocumentRecord>> {
    let kind = self.kind;
    let number_str = number.as_str().to_owned();

    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT document_id, identity_number, fields_json, user_id, ingested_at
             FROM documents WHERE identity_number = ?1",
            rusqlite::params![number_str],
            map_document_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(|raw| raw.into_record(kind)).transpose()
  }

  async fn get_document(&self, document_id: i64) -> Result<Option<DocumentRecord>> {
    let kind = self.kind;

    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT document_id, identity_number, fields_json, user_id, ingested_at
             FROM documents WHERE document_id = ?1",
            rusqlite::params![document_id],
            map_document_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(|raw| raw.into_record(kind)).transpose()
  }

  async fn count_documents(&self) -> Result<i64> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?)
      })
      .await?;
    Ok(count)
  }

  async fn metrics(&self) -> Result<StoreMetrics> {
    let kind = self.kind;

    let (total, unique, groups, dup_rows): (i64, i64, i64, i64) = self
      .conn
      .call(|conn| {
        let total: i64 =
          conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
        let unique: i64 = conn.query_row(
          "SELECT COUNT(DISTINCT identity_number) FROM documents",
          [],
          |r| r.get(0),
        )?;
        let groups: i64 = conn.query_row(
          "SELECT COUNT(*) FROM (
             SELECT identity_number FROM documents
             GROUP BY identity_number HAVING COUNT(*) > 1
           )",
          [],
          |r| r.get(0),
        )?;
        let dup_rows: i64 = conn.query_row(
          "SELECT COALESCE(SUM(n), 0) FROM (
             SELECT COUNT(*) AS n FROM documents
             GROUP BY identity_number HAVING COUNT(*) > 1
           )",
          [],
          |r| r.get(0),
        )?;
        Ok((total, unique, groups, dup_rows))
      })
      .await?;

    Ok(StoreMetrics {
      kind,
      total_rows:       total,
      unique_numbers:   unique,
      duplicate_groups: groups,
      duplicate_rows:   dup_rows,
    })
  }
}
