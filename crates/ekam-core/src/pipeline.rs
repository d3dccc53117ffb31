//! The ingestion pipeline: normalize, pre-check, create-or-reuse user,
//! persist, link. Hint-less secondary-kind documents persist before the
//! user exists, see [`Ingestor::ingest`].
//!
//! The pre-check is an early, non-authoritative short-circuit; the final
//! uniqueness decision always rests with the per-kind store's unique index.
//! Two concurrent ingestions of the same number therefore resolve to exactly
//! one `Created`/`Linked` and one `Duplicate`, whichever way the pre-checks
//! race.

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  document::{ExtractedFields, ExtractionResult, NewDocument},
  error::{Error, Result},
  identity::{DocumentKind, IdentityNumber},
  outcome::{
    ConflictInfo, DuplicateReport, IngestOutcome, InsertOutcome, LinkOutcome, Uniqueness,
  },
  store::{DocumentStore, RegistryStore},
  user::UserStatistics,
};

/// The online ingestion component. Constructed once per process with
/// injected store handles; holds no other state.
pub struct Ingestor<R, D> {
  registry: R,
  aadhaar:  D,
  pan:      D,
}

impl<R, D> Ingestor<R, D>
where
  R: RegistryStore,
  D: DocumentStore,
{
  pub fn new(registry: R, aadhaar: D, pan: D) -> Self {
    Self { registry, aadhaar, pan }
  }

  pub fn registry(&self) -> &R {
    &self.registry
  }

  pub fn store_for(&self, kind: DocumentKind) -> &D {
    match kind {
      DocumentKind::Aadhaar => &self.aadhaar,
      DocumentKind::Pan => &self.pan,
    }
  }

  // ── Duplicate detection ───────────────────────────────────────────────────

  /// Check whether `number` already exists anywhere: the per-kind store's
  /// unique index first, then the registry's primary numbers (which catches
  /// a number already claimed by a user whose document row is gone or was
  /// recorded under another kind, where number spaces overlap).
  ///
  /// Store failures surface as [`Error::DetectionUnavailable`]; callers must
  /// fail closed rather than treat them as "no duplicate".
  pub async fn check_uniqueness(
    &self,
    kind: DocumentKind,
    number: &IdentityNumber,
  ) -> Result<Uniqueness> {
    let existing = self
      .store_for(kind)
      .find_by_number(number)
      .await
      .map_err(|e| Error::DetectionUnavailable(Box::new(e)))?;

    if let Some(doc) = existing {
      return Ok(Uniqueness::Conflict(ConflictInfo {
        kind,
        user_id: doc.user_id,
        document_id: Some(doc.document_id),
        ingested_at: doc.ingested_at,
      }));
    }

    let registered = self
      .registry
      .lookup_by_identity_number(number)
      .await
      .map_err(|e| Error::DetectionUnavailable(Box::new(e)))?;

    if let Some(user) = registered {
      let link = self
        .registry
        .get_link(user.user_id, kind)
        .await
        .map_err(|e| Error::DetectionUnavailable(Box::new(e)))?;
      return Ok(Uniqueness::Conflict(ConflictInfo {
        kind,
        user_id: Some(user.user_id),
        document_id: link.map(|l| l.document_id),
        ingested_at: user.created_at,
      }));
    }

    Ok(Uniqueness::Unique)
  }

  /// Aggregate duplicate counts across every per-kind store. Read-only.
  pub async fn duplicate_report(&self) -> Result<DuplicateReport> {
    let mut stores = Vec::with_capacity(DocumentKind::ALL.len());
    for kind in DocumentKind::ALL {
      let metrics = self.store_for(kind).metrics().await.map_err(|e| {
        Error::StoreUnavailable { kind, source: Box::new(e) }
      })?;
      stores.push(metrics);
    }
    Ok(DuplicateReport { generated_at: chrono::Utc::now(), stores })
  }

  pub async fn user_statistics(&self) -> Result<UserStatistics> {
    self
      .registry
      .user_statistics()
      .await
      .map_err(|e| Error::RegistryUnavailable(Box::new(e)))
  }

  // ── Ingestion ─────────────────────────────────────────────────────────────

  /// Run one extraction result through the full pipeline.
  ///
  /// `Err` is reserved for infrastructure failures; every expected outcome
  /// (duplicate, bad format, policy violation) is an [`IngestOutcome`].
  pub async fn ingest(&self, input: ExtractionResult) -> Result<IngestOutcome> {
    let kind = input.kind;

    // 1. Normalize. Format problems are caller-correctable rejections.
    let number = match IdentityNumber::normalize(kind, &input.raw_identity_number) {
      Ok(n) => n,
      Err(e @ Error::InvalidFormat { .. }) => {
        debug!(%kind, "rejected: {e}");
        return Ok(IngestOutcome::Rejected { reason: e.to_string() });
      }
      Err(e) => return Err(e),
    };

    let fields = match ExtractedFields::new(kind, input.fields) {
      Ok(f) => f,
      Err(e @ Error::UnknownField { .. }) => {
        debug!(%kind, "rejected: {e}");
        return Ok(IngestOutcome::Rejected { reason: e.to_string() });
      }
      Err(e) => return Err(e),
    };

    // 2. Early duplicate check. Fails closed on store errors.
    if let Uniqueness::Conflict(conflict) = self.check_uniqueness(kind, &number).await? {
      info!(%kind, "duplicate blocked before write");
      return Ok(IngestOutcome::Duplicate { conflict });
    }

    // A secondary kind with no upstream hint takes its own path: the
    // document insert must be won before any user row exists, so a lost
    // race never strands a numberless user.
    if input.user_hint.is_none() && !kind.is_primary() {
      return self.ingest_secondary(kind, number, fields, input.name).await;
    }

    // 3. Resolve the user: an upstream hint wins, otherwise the
    // primary-number registry. `via_number` marks a user reached through
    // this very number.
    let (user, created, via_number) = match input.user_hint {
      Some(hint) => {
        let Some(user) = self
          .registry
          .lookup_by_user_id(hint)
          .await
          .map_err(|e| Error::RegistryUnavailable(Box::new(e)))?
        else {
          return Ok(IngestOutcome::Rejected {
            reason: format!("unknown user referenced by upstream: {hint}"),
          });
        };
        (user, false, false)
      }
      None => {
        let (user, created) = self
          .registry
          .get_or_create_user(number.clone(), input.name)
          .await
          .map_err(|e| Error::RegistryUnavailable(Box::new(e)))?;
        (user, created, true)
      }
    };

    // An existing link for this kind ends the attempt here, before writing
    // a row we could not link. When the user was resolved through this very
    // number the linked document necessarily holds it, so a concurrent
    // ingestion that lost the race is reported as a duplicate; a hinted
    // second document of the same kind is a policy rejection instead.
    if !created {
      let link = self
        .registry
        .get_link(user.user_id, kind)
        .await
        .map_err(|e| Error::RegistryUnavailable(Box::new(e)))?;
      if let Some(link) = link {
        if via_number {
          info!(%kind, "duplicate blocked at link stage");
          return Ok(IngestOutcome::Duplicate {
            conflict: ConflictInfo {
              kind,
              user_id: Some(user.user_id),
              document_id: Some(link.document_id),
              ingested_at: link.linked_at,
            },
          });
        }
        return Ok(IngestOutcome::Rejected {
          reason: format!("user already has a {kind} document on file"),
        });
      }
    }

    // 4. Persist. The unique index is the atomic backstop: losing a race
    // here is reported as a duplicate, exactly like the pre-check path.
    let insert = self
      .store_for(kind)
      .insert_document(NewDocument {
        identity_number: number,
        fields,
        user_id: user.user_id,
      })
      .await
      .map_err(|e| Error::StoreUnavailable { kind, source: Box::new(e) })?;

    let document = match insert {
      InsertOutcome::Inserted(doc) => doc,
      InsertOutcome::Conflict(conflict) => {
        info!(%kind, "duplicate blocked by unique constraint");
        return Ok(IngestOutcome::Duplicate { conflict });
      }
    };

    // 5. Link and bump the document count, atomically.
    let link = self
      .registry
      .link(user.user_id, kind, document.document_id)
      .await
      .map_err(|e| Error::RegistryUnavailable(Box::new(e)))?;

    if let LinkOutcome::AlreadyLinked { .. } = link {
      // Lost a same-user race after the insert; the row stays for the
      // cleanup migrator, which alone may remove data.
      return Ok(IngestOutcome::Rejected {
        reason: format!("user already has a {kind} document on file"),
      });
    }

    let outcome = if created {
      info!(%kind, user_id = %user.user_id, document_id = document.document_id, "created");
      IngestOutcome::Created { user_id: user.user_id, document_id: document.document_id }
    } else {
      info!(%kind, user_id = %user.user_id, document_id = document.document_id, "linked");
      IngestOutcome::Linked { user_id: user.user_id, document_id: document.document_id }
    };
    Ok(outcome)
  }

  /// Ingest a secondary-kind document for a person not yet in the registry.
  ///
  /// The user id is picked up front and the document row is written first;
  /// the store's unique index arbitrates concurrent attempts on the same
  /// number, and only the winner goes on to create the user and link. The
  /// loser returns `Duplicate` without having written a user row.
  async fn ingest_secondary(
    &self,
    kind: DocumentKind,
    number: IdentityNumber,
    fields: ExtractedFields,
    name: String,
  ) -> Result<IngestOutcome> {
    let user_id = Uuid::new_v4();

    let insert = self
      .store_for(kind)
      .insert_document(NewDocument { identity_number: number, fields, user_id })
      .await
      .map_err(|e| Error::StoreUnavailable { kind, source: Box::new(e) })?;

    let document = match insert {
      InsertOutcome::Inserted(doc) => doc,
      InsertOutcome::Conflict(conflict) => {
        info!(%kind, "duplicate blocked by unique constraint");
        return Ok(IngestOutcome::Duplicate { conflict });
      }
    };

    let user = self
      .registry
      .create_user(user_id, name)
      .await
      .map_err(|e| Error::RegistryUnavailable(Box::new(e)))?;

    self
      .registry
      .link(user.user_id, kind, document.document_id)
      .await
      .map_err(|e| Error::RegistryUnavailable(Box::new(e)))?;

    info!(%kind, user_id = %user.user_id, document_id = document.document_id, "created");
    Ok(IngestOutcome::Created {
      user_id: user.user_id,
      document_id: document.document_id,
    })
  }
}
