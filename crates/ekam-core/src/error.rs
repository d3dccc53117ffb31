//! Error types for `ekam-core`.
//!
//! Expected, frequent outcomes (duplicate found, second document of a kind)
//! are NOT errors at the pipeline boundary — they are [`IngestOutcome`]
//! variants. The variants here cover caller-correctable input problems and
//! infrastructure failures.
//!
//! [`IngestOutcome`]: crate::outcome::IngestOutcome

use thiserror::Error;

use crate::identity::DocumentKind;

#[derive(Debug, Error)]
pub enum Error {
  /// Normalization rejected the raw number. The message deliberately omits
  /// the raw value so it cannot leak through error channels.
  #[error("invalid {kind} number: {reason}")]
  InvalidFormat { kind: DocumentKind, reason: String },

  #[error("unknown document kind: {0:?}")]
  UnknownDocumentKind(String),

  #[error("unknown {kind} field: {field:?}")]
  UnknownField { kind: DocumentKind, field: String },

  /// The duplicate check could not be performed. Callers must fail closed:
  /// this is never treated as "no duplicate".
  #[error("duplicate detection unavailable: {0}")]
  DetectionUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("identity registry unavailable: {0}")]
  RegistryUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("{kind} store unavailable: {source}")]
  StoreUnavailable {
    kind:   DocumentKind,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
