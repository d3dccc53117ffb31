//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Extracted fields are stored
//! as compact JSON maps. UUIDs are stored as hyphenated lowercase strings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ekam_core::{
  document::{DocumentRecord, ExtractedFields},
  identity::{DocumentKind, IdentityNumber},
  link::CrossReference,
  user::User,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String {
  id.hyphenated().to_string()
}

pub fn decode_uuid(s: &str) -> Result<Uuid> {
  Ok(Uuid::parse_str(s)?)
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339()
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── DocumentKind ────────────────────────────────────────────────────────────

pub fn encode_kind(k: DocumentKind) -> &'static str {
  k.as_str()
}

pub fn decode_kind(s: &str) -> Result<DocumentKind> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown document kind: {s:?}")))
}

// ─── Extracted fields ────────────────────────────────────────────────────────

pub fn encode_fields(fields: &ExtractedFields) -> Result<String> {
  Ok(serde_json::to_string(fields.values())?)
}

pub fn decode_fields(s: &str) -> Result<ExtractedFields> {
  let values: BTreeMap<String, String> = serde_json::from_str(s)?;
  Ok(ExtractedFields::from_stored(values))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `users` row.
pub struct RawUser {
  pub user_id:                 String,
  pub primary_identity_number: Option<String>,
  pub primary_name:            String,
  pub created_at:              String,
  pub updated_at:              String,
  pub document_count:          i64,
}

impl RawUser {
  pub fn into_user(self) -> Result<User> {
    Ok(User {
      user_id:                 decode_uuid(&self.user_id)?,
      primary_identity_number: self.primary_identity_number.map(IdentityNumber::from_stored),
      primary_name:            self.primary_name,
      created_at:              decode_dt(&self.created_at)?,
      updated_at:              decode_dt(&self.updated_at)?,
      document_count:          self.document_count,
    })
  }
}

/// Raw strings read directly from a `documents` row.
pub struct RawDocument {
  pub document_id:     i64,
  pub identity_number: String,
  pub fields_json:     String,
  pub user_id:         Option<String>,
  pub ingested_at:     String,
}

impl RawDocument {
  pub fn into_record(self, kind: DocumentKind) -> Result<DocumentRecord> {
    Ok(DocumentRecord {
      document_id:     self.document_id,
      kind,
      identity_number: IdentityNumber::from_stored(self.identity_number),
      fields:          decode_fields(&self.fields_json)?,
      user_id:         self.user_id.as_deref().map(decode_uuid).transpose()?,
      ingested_at:     decode_dt(&self.ingested_at)?,
    })
  }
}

/// Raw strings read directly from a `cross_references` row.
pub struct RawCrossReference {
  pub user_id:       String,
  pub document_kind: String,
  pub document_id:   i64,
  pub linked_at:     String,
}

impl RawCrossReference {
  pub fn into_link(self) -> Result<CrossReference> {
    Ok(CrossReference {
      user_id:     decode_uuid(&self.user_id)?,
      kind:        decode_kind(&self.document_kind)?,
      document_id: self.document_id,
      linked_at:   decode_dt(&self.linked_at)?,
    })
  }
}
