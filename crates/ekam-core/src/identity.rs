//! Document kinds and normalized identity numbers.
//!
//! An [`IdentityNumber`] is always held in canonical form: separators
//! stripped, letters upper-cased, structural pattern checked. Equality on the
//! type therefore means "the same real-world number", regardless of how the
//! raw value was formatted upstream.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ─── DocumentKind ────────────────────────────────────────────────────────────

/// The category of source document. Each kind has its own store and its own
/// identity-number format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
  /// 12-digit national identity number.
  Aadhaar,
  /// 10-character tax identity number (5 letters, 4 digits, 1 letter).
  Pan,
}

impl DocumentKind {
  pub const ALL: [DocumentKind; 2] = [DocumentKind::Aadhaar, DocumentKind::Pan];

  pub fn as_str(self) -> &'static str {
    match self {
      DocumentKind::Aadhaar => "aadhaar",
      DocumentKind::Pan => "pan",
    }
  }

  /// Whether this kind's number doubles as a user's primary identity
  /// number in the registry.
  pub fn is_primary(self) -> bool {
    matches!(self, DocumentKind::Aadhaar)
  }
}

impl fmt::Display for DocumentKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for DocumentKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "aadhaar" => Ok(DocumentKind::Aadhaar),
      "pan" => Ok(DocumentKind::Pan),
      other => Err(Error::UnknownDocumentKind(other.to_owned())),
    }
  }
}

// ─── IdentityNumber ──────────────────────────────────────────────────────────

/// A normalized identity number. Construct via [`IdentityNumber::normalize`];
/// the inner string is guaranteed to match its kind's structural pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityNumber(String);

impl IdentityNumber {
  /// Canonicalize `raw` for `kind`: drop whitespace and punctuation
  /// separators, upper-case letters, then validate the structural pattern.
  ///
  /// Idempotent: normalizing an already-normalized number is a no-op.
  pub fn normalize(kind: DocumentKind, raw: &str) -> Result<Self> {
    let cleaned: String = raw
      .chars()
      .filter(|c| c.is_ascii_alphanumeric())
      .map(|c| c.to_ascii_uppercase())
      .collect();

    match kind {
      DocumentKind::Aadhaar => {
        // Masked scans render hidden digits as 'X'; those are accepted as-is.
        if cleaned.len() != 12 {
          return Err(Error::InvalidFormat {
            kind,
            reason: format!("expected 12 digits, got {} characters", cleaned.len()),
          });
        }
        if !cleaned.chars().all(|c| c.is_ascii_digit() || c == 'X') {
          return Err(Error::InvalidFormat {
            kind,
            reason: "contains characters other than digits".to_owned(),
          });
        }
      }
      DocumentKind::Pan => {
        if cleaned.len() != 10 {
          return Err(Error::InvalidFormat {
            kind,
            reason: format!("expected 10 characters, got {}", cleaned.len()),
          });
        }
        let bytes = cleaned.as_bytes();
        let shape_ok = bytes[..5].iter().all(u8::is_ascii_uppercase)
          && bytes[5..9].iter().all(u8::is_ascii_digit)
          && bytes[9].is_ascii_uppercase();
        if !shape_ok {
          return Err(Error::InvalidFormat {
            kind,
            reason: "expected 5 letters, 4 digits, 1 letter".to_owned(),
          });
        }
      }
    }

    Ok(Self(cleaned))
  }

  /// Wrap a value read back from storage, which was normalized on the way in.
  pub fn from_stored(s: String) -> Self {
    Self(s)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for IdentityNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn aadhaar_separator_variants_normalize_identically() {
    let spaced = IdentityNumber::normalize(DocumentKind::Aadhaar, "1234 5678 9012").unwrap();
    let dashed = IdentityNumber::normalize(DocumentKind::Aadhaar, "1234-5678-9012").unwrap();
    let plain = IdentityNumber::normalize(DocumentKind::Aadhaar, "123456789012").unwrap();
    assert_eq!(spaced, dashed);
    assert_eq!(dashed, plain);
    assert_eq!(plain.as_str(), "123456789012");
  }

  #[test]
  fn normalize_is_idempotent() {
    let once = IdentityNumber::normalize(DocumentKind::Pan, "abcde-1234-f").unwrap();
    let twice = IdentityNumber::normalize(DocumentKind::Pan, once.as_str()).unwrap();
    assert_eq!(once, twice);
  }

  #[test]
  fn pan_is_upper_cased() {
    let n = IdentityNumber::normalize(DocumentKind::Pan, "abcde1234f").unwrap();
    assert_eq!(n.as_str(), "ABCDE1234F");
  }

  #[test]
  fn masked_aadhaar_accepted() {
    let n = IdentityNumber::normalize(DocumentKind::Aadhaar, "XXXX XXXX 9012").unwrap();
    assert_eq!(n.as_str(), "XXXXXXXX9012");
  }

  #[test]
  fn aadhaar_wrong_length_rejected() {
    let err = IdentityNumber::normalize(DocumentKind::Aadhaar, "1234 5678 901").unwrap_err();
    assert!(matches!(err, Error::InvalidFormat { kind: DocumentKind::Aadhaar, .. }));
  }

  #[test]
  fn aadhaar_letters_rejected() {
    let err = IdentityNumber::normalize(DocumentKind::Aadhaar, "1234 5678 90AB").unwrap_err();
    assert!(matches!(err, Error::InvalidFormat { .. }));
  }

  #[test]
  fn pan_bad_shape_rejected() {
    // Digits where letters are expected.
    let err = IdentityNumber::normalize(DocumentKind::Pan, "1BCDE1234F").unwrap_err();
    assert!(matches!(err, Error::InvalidFormat { kind: DocumentKind::Pan, .. }));
  }

  #[test]
  fn error_display_omits_the_raw_number() {
    let err = IdentityNumber::normalize(DocumentKind::Aadhaar, "1234 5678 90").unwrap_err();
    assert!(!err.to_string().contains("1234"));
  }
}
