//! The [`RegistryStore`] and [`DocumentStore`] traits.
//!
//! The traits are implemented by storage backends (e.g.
//! `ekam-store-sqlite`). Higher layers (`ekam-api`, the ingestion pipeline)
//! depend on these abstractions, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  document::{DocumentRecord, NewDocument},
  identity::{DocumentKind, IdentityNumber},
  link::CrossReference,
  outcome::{InsertOutcome, LinkOutcome, StoreMetrics},
  user::{User, UserStatistics},
};

// ─── Registry ────────────────────────────────────────────────────────────────

/// The single source of truth mapping a normalized identity number to one
/// durable user id. Also owns the cross-reference link table, which
/// physically lives beside the user rows.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait RegistryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Return the user holding `number`, creating one if none exists. The
  /// boolean is `true` when this call created the user.
  ///
  /// Must behave as if executed under a global lock per number: implemented
  /// as an atomic insert-or-read-existing against the unique constraint,
  /// never as an unguarded check-then-insert. The existing user's name is
  /// never overwritten.
  fn get_or_create_user(
    &self,
    number: IdentityNumber,
    name: String,
  ) -> impl Future<Output = Result<(User, bool), Self::Error>> + Send + '_;

  /// Create a user with no primary identity number, under a caller-assigned
  /// id. For people known only by a secondary document kind; the pipeline
  /// picks the id before it has won the document insert, so the registry
  /// must take it as given. Always creates.
  fn create_user(
    &self,
    user_id: Uuid,
    name: String,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn user_exists<'a>(
    &'a self,
    number: &'a IdentityNumber,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn lookup_by_identity_number<'a>(
    &'a self,
    number: &'a IdentityNumber,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  fn lookup_by_user_id(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Record that `user_id` holds `document_id` for `kind`, and bump the
  /// user's `document_count` — both in one transaction. Linking the same
  /// document twice succeeds idempotently without a second increment.
  fn link(
    &self,
    user_id: Uuid,
    kind: DocumentKind,
    document_id: i64,
  ) -> impl Future<Output = Result<LinkOutcome, Self::Error>> + Send + '_;

  /// The existing cross-reference for `(user_id, kind)`, if any.
  fn get_link(
    &self,
    user_id: Uuid,
    kind: DocumentKind,
  ) -> impl Future<Output = Result<Option<CrossReference>, Self::Error>> + Send + '_;

  fn user_statistics(
    &self,
  ) -> impl Future<Output = Result<UserStatistics, Self::Error>> + Send + '_;
}

// ─── Per-kind document store ─────────────────────────────────────────────────

/// One store per document kind. The store's unique index on the normalized
/// identity number is the atomic backstop for duplicate prevention.
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn kind(&self) -> DocumentKind;

  /// Insert a document; `document_id` and `ingested_at` are assigned by the
  /// store. A unique-constraint hit is reported as
  /// [`InsertOutcome::Conflict`] with the winning row's coordinates, never
  /// as an `Err`.
  fn insert_document(
    &self,
    input: NewDocument,
  ) -> impl Future<Output = Result<InsertOutcome, Self::Error>> + Send + '_;

  /// Point lookup through the unique index on the normalized number.
  fn find_by_number<'a>(
    &'a self,
    number: &'a IdentityNumber,
  ) -> impl Future<Output = Result<Option<DocumentRecord>, Self::Error>> + Send + 'a;

  fn get_document(
    &self,
    document_id: i64,
  ) -> impl Future<Output = Result<Option<DocumentRecord>, Self::Error>> + Send + '_;

  fn count_documents(
    &self,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// Duplicate and data-quality counts for this store; read-only.
  fn metrics(
    &self,
  ) -> impl Future<Output = Result<StoreMetrics, Self::Error>> + Send + '_;
}
