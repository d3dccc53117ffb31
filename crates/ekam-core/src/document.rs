//! Document records and their kind-specific extracted field sets.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  error::{Error, Result},
  identity::{DocumentKind, IdentityNumber},
};

// ─── ExtractedFields ─────────────────────────────────────────────────────────

/// The kind-specific field set captured from a document, as a name → value
/// map with a fixed allowed key set per kind. Validated at the ingestion
/// boundary; values are passed through to storage unvalidated beyond that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedFields {
  values: BTreeMap<String, String>,
}

/// Allowed field names for Aadhaar documents.
pub const AADHAAR_FIELDS: &[&str] = &["name", "dob", "gender", "address"];
/// Allowed field names for PAN documents.
pub const PAN_FIELDS: &[&str] = &["name", "father_name", "dob"];

impl ExtractedFields {
  pub fn allowed_keys(kind: DocumentKind) -> &'static [&'static str] {
    match kind {
      DocumentKind::Aadhaar => AADHAAR_FIELDS,
      DocumentKind::Pan => PAN_FIELDS,
    }
  }

  /// Validate `values` against `kind`'s allowed key set.
  pub fn new(kind: DocumentKind, values: BTreeMap<String, String>) -> Result<Self> {
    for key in values.keys() {
      if !Self::allowed_keys(kind).contains(&key.as_str()) {
        return Err(Error::UnknownField { kind, field: key.clone() });
      }
    }
    Ok(Self { values })
  }

  pub fn empty() -> Self {
    Self { values: BTreeMap::new() }
  }

  /// Wrap a map read back from storage without re-validating; rows written
  /// before the allowed-key sets were introduced may carry extra keys.
  pub fn from_stored(values: BTreeMap<String, String>) -> Self {
    Self { values }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.values.get(key).map(String::as_str)
  }

  pub fn values(&self) -> &BTreeMap<String, String> {
    &self.values
  }

  /// Number of fields with a non-empty value — the completeness score used
  /// by the cleanup migrator's survivor policy.
  pub fn non_empty_count(&self) -> usize {
    self.values.values().filter(|v| !v.trim().is_empty()).count()
  }
}

// ─── DocumentRecord ──────────────────────────────────────────────────────────

/// One successfully ingested document, as stored in its per-kind store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
  /// Store-local auto-incrementing identifier.
  pub document_id:     i64,
  pub kind:            DocumentKind,
  pub identity_number: IdentityNumber,
  pub fields:          ExtractedFields,
  /// Absent only for legacy rows written before the user system existed.
  pub user_id:         Option<Uuid>,
  pub ingested_at:     DateTime<Utc>,
}

/// Input to [`DocumentStore::insert_document`]; `document_id` and
/// `ingested_at` are assigned by the store.
///
/// [`DocumentStore::insert_document`]: crate::store::DocumentStore::insert_document
#[derive(Debug, Clone)]
pub struct NewDocument {
  pub identity_number: IdentityNumber,
  pub fields:          ExtractedFields,
  pub user_id:         Uuid,
}

// ─── ExtractionResult ────────────────────────────────────────────────────────

/// What the upstream OCR/extraction pipeline hands to the core. Only `kind`
/// and `raw_identity_number` are interpreted here; the rest is carried
/// through to storage.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionResult {
  pub kind:                DocumentKind,
  pub raw_identity_number: String,
  pub name:                String,
  #[serde(default)]
  pub fields:              BTreeMap<String, String>,
  #[serde(default)]
  pub confidence:          Option<f64>,
  /// Set when upstream has already established which user this document
  /// belongs to (e.g. a tax document following a national-ID document for
  /// the same person in one session).
  #[serde(default)]
  pub user_hint:           Option<Uuid>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_field_rejected() {
    let mut m = BTreeMap::new();
    m.insert("name".to_owned(), "Asha Rao".to_owned());
    m.insert("favourite_colour".to_owned(), "blue".to_owned());
    let err = ExtractedFields::new(DocumentKind::Aadhaar, m).unwrap_err();
    assert!(matches!(err, Error::UnknownField { field, .. } if field == "favourite_colour"));
  }

  #[test]
  fn non_empty_count_ignores_blank_values() {
    let mut m = BTreeMap::new();
    m.insert("name".to_owned(), "Asha Rao".to_owned());
    m.insert("dob".to_owned(), "  ".to_owned());
    m.insert("gender".to_owned(), "F".to_owned());
    let fields = ExtractedFields::new(DocumentKind::Aadhaar, m).unwrap();
    assert_eq!(fields.non_empty_count(), 2);
  }
}
