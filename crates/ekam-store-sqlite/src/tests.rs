//! Integration tests for the SQLite registry and document stores against
//! in-memory databases, including the full ingestion pipeline.

use std::collections::BTreeMap;

use ekam_core::{
  document::{ExtractionResult, NewDocument},
  identity::{DocumentKind, IdentityNumber},
  outcome::{IngestOutcome, InsertOutcome, LinkOutcome, Uniqueness},
  pipeline::Ingestor,
  store::{DocumentStore, RegistryStore},
};
use uuid::Uuid;

use crate::{SqliteDocumentStore, SqliteRegistry};

async fn registry() -> SqliteRegistry {
  SqliteRegistry::open_in_memory().await.expect("in-memory registry")
}

async fn documents(kind: DocumentKind) -> SqliteDocumentStore {
  SqliteDocumentStore::open_in_memory(kind).await.expect("in-memory store")
}

async fn ingestor() -> Ingestor<SqliteRegistry, SqliteDocumentStore> {
  Ingestor::new(
    registry().await,
    documents(DocumentKind::Aadhaar).await,
    documents(DocumentKind::Pan).await,
  )
}

fn aadhaar(raw: &str) -> IdentityNumber {
  IdentityNumber::normalize(DocumentKind::Aadhaar, raw).unwrap()
}

fn extraction(kind: DocumentKind, raw: &str, name: &str) -> ExtractionResult {
  ExtractionResult {
    kind,
    raw_identity_number: raw.to_owned(),
    name: name.to_owned(),
    fields: BTreeMap::new(),
    confidence: Some(0.9),
    user_hint: None,
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_or_create_issues_one_user_per_number() {
  let r = registry().await;
  let n = aadhaar("1234 5678 9012");

  let (first, created) = r.get_or_create_user(n.clone(), "Asha Rao".into()).await.unwrap();
  assert!(created);
  assert_eq!(first.primary_name, "Asha Rao");
  assert_eq!(first.document_count, 0);

  let (second, created) = r.get_or_create_user(n.clone(), "A. Rao".into()).await.unwrap();
  assert!(!created);
  assert_eq!(second.user_id, first.user_id);
  // The first captured name sticks.
  assert_eq!(second.primary_name, "Asha Rao");
}

#[tokio::test]
async fn format_variants_resolve_to_the_same_user() {
  let r = registry().await;

  let (first, _) = r
    .get_or_create_user(aadhaar("1234-5678-9012"), "Asha Rao".into())
    .await
    .unwrap();
  let (second, created) = r
    .get_or_create_user(aadhaar("1234 5678 9012"), "Asha Rao".into())
    .await
    .unwrap();

  assert!(!created);
  assert_eq!(first.user_id, second.user_id);
}

#[tokio::test]
async fn concurrent_get_or_create_yields_one_user() {
  let r = registry().await;
  let n = aadhaar("9999 8888 7777");

  let (a, b) = tokio::join!(
    r.get_or_create_user(n.clone(), "R. Singh".into()),
    r.get_or_create_user(n.clone(), "R. Singh".into()),
  );
  let (a, a_created) = a.unwrap();
  let (b, b_created) = b.unwrap();

  assert_eq!(a.user_id, b.user_id);
  assert!(a_created != b_created, "exactly one call creates");
}

#[tokio::test]
async fn lookups_by_number_and_id() {
  let r = registry().await;
  let n = aadhaar("1234 5678 9012");

  assert!(!r.user_exists(&n).await.unwrap());

  let (user, _) = r.get_or_create_user(n.clone(), "Asha Rao".into()).await.unwrap();

  assert!(r.user_exists(&n).await.unwrap());
  let by_number = r.lookup_by_identity_number(&n).await.unwrap().unwrap();
  assert_eq!(by_number.user_id, user.user_id);
  let by_id = r.lookup_by_user_id(user.user_id).await.unwrap().unwrap();
  assert_eq!(by_id.primary_name, "Asha Rao");

  assert!(r.lookup_by_user_id(Uuid::new_v4()).await.unwrap().is_none());
}

// ─── Linking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn link_increments_document_count() {
  let r = registry().await;
  let (user, _) = r
    .get_or_create_user(aadhaar("1234 5678 9012"), "Asha Rao".into())
    .await
    .unwrap();

  let out = r.link(user.user_id, DocumentKind::Aadhaar, 7).await.unwrap();
  assert!(matches!(out, LinkOutcome::Linked(_)));

  let refreshed = r.lookup_by_user_id(user.user_id).await.unwrap().unwrap();
  assert_eq!(refreshed.document_count, 1);
}

#[tokio::test]
async fn second_kind_links_independently() {
  let r = registry().await;
  let (user, _) = r
    .get_or_create_user(aadhaar("1234 5678 9012"), "Asha Rao".into())
    .await
    .unwrap();

  r.link(user.user_id, DocumentKind::Aadhaar, 1).await.unwrap();
  r.link(user.user_id, DocumentKind::Pan, 2).await.unwrap();

  let refreshed = r.lookup_by_user_id(user.user_id).await.unwrap().unwrap();
  assert_eq!(refreshed.document_count, 2);
}

#[tokio::test]
async fn double_link_same_kind_is_rejected() {
  let r = registry().await;
  let (user, _) = r
    .get_or_create_user(aadhaar("1234 5678 9012"), "Asha Rao".into())
    .await
    .unwrap();

  r.link(user.user_id, DocumentKind::Aadhaar, 1).await.unwrap();
  let out = r.link(user.user_id, DocumentKind::Aadhaar, 2).await.unwrap();
  assert!(
    matches!(out, LinkOutcome::AlreadyLinked { existing } if existing.document_id == 1)
  );

  // The failed link must not have bumped the count.
  let refreshed = r.lookup_by_user_id(user.user_id).await.unwrap().unwrap();
  assert_eq!(refreshed.document_count, 1);
}

#[tokio::test]
async fn relink_same_document_is_idempotent() {
  let r = registry().await;
  let (user, _) = r
    .get_or_create_user(aadhaar("1234 5678 9012"), "Asha Rao".into())
    .await
    .unwrap();

  r.link(user.user_id, DocumentKind::Aadhaar, 1).await.unwrap();
  let out = r.link(user.user_id, DocumentKind::Aadhaar, 1).await.unwrap();
  assert!(matches!(out, LinkOutcome::Linked(_)));

  let refreshed = r.lookup_by_user_id(user.user_id).await.unwrap().unwrap();
  assert_eq!(refreshed.document_count, 1, "no second increment");
}

// ─── Document store ──────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_fetch_document() {
  let d = documents(DocumentKind::Aadhaar).await;
  let n = aadhaar("1234 5678 9012");
  let user_id = Uuid::new_v4();

  let out = d
    .insert_document(NewDocument {
      identity_number: n.clone(),
      fields: ekam_core::document::ExtractedFields::empty(),
      user_id,
    })
    .await
    .unwrap();

  let InsertOutcome::Inserted(doc) = out else { panic!("expected insert") };
  assert_eq!(doc.identity_number, n);
  assert_eq!(doc.user_id, Some(user_id));

  let found = d.find_by_number(&n).await.unwrap().unwrap();
  assert_eq!(found.document_id, doc.document_id);
  let by_id = d.get_document(doc.document_id).await.unwrap().unwrap();
  assert_eq!(by_id.identity_number, n);
}

#[tokio::test]
async fn duplicate_insert_reports_conflict_not_error() {
  let d = documents(DocumentKind::Aadhaar).await;
  let n = aadhaar("1234 5678 9012");

  let first = d
    .insert_document(NewDocument {
      identity_number: n.clone(),
      fields: ekam_core::document::ExtractedFields::empty(),
      user_id: Uuid::new_v4(),
    })
    .await
    .unwrap();
  let InsertOutcome::Inserted(first) = first else { panic!("expected insert") };

  let second = d
    .insert_document(NewDocument {
      identity_number: n.clone(),
      fields: ekam_core::document::ExtractedFields::empty(),
      user_id: Uuid::new_v4(),
    })
    .await
    .unwrap();

  let InsertOutcome::Conflict(conflict) = second else { panic!("expected conflict") };
  assert_eq!(conflict.document_id, Some(first.document_id));
  assert_eq!(d.count_documents().await.unwrap(), 1);
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_creates_then_blocks_format_variant() {
  let ing = ingestor().await;

  let first = ing
    .ingest(extraction(DocumentKind::Aadhaar, "1234 5678 9012", "Asha Rao"))
    .await
    .unwrap();
  let IngestOutcome::Created { user_id, document_id } = first else {
    panic!("expected Created, got {first:?}");
  };

  // Same number, different separators: duplicate referencing the original.
  let second = ing
    .ingest(extraction(DocumentKind::Aadhaar, "123456789012", "Asha Rao"))
    .await
    .unwrap();
  let IngestOutcome::Duplicate { conflict } = second else {
    panic!("expected Duplicate, got {second:?}");
  };
  assert_eq!(conflict.user_id, Some(user_id));
  assert_eq!(conflict.document_id, Some(document_id));
}

#[tokio::test]
async fn ingest_rejects_invalid_format() {
  let ing = ingestor().await;

  let out = ing
    .ingest(extraction(DocumentKind::Aadhaar, "1234 5678", "Asha Rao"))
    .await
    .unwrap();
  assert!(matches!(out, IngestOutcome::Rejected { .. }));

  let out = ing
    .ingest(extraction(DocumentKind::Pan, "ABC1234567", "Asha Rao"))
    .await
    .unwrap();
  assert!(matches!(out, IngestOutcome::Rejected { .. }));
}

#[tokio::test]
async fn ingest_rejects_unknown_fields() {
  let ing = ingestor().await;

  let mut input = extraction(DocumentKind::Pan, "ABCDE1234F", "Asha Rao");
  input.fields.insert("favourite_colour".into(), "blue".into());

  let out = ing.ingest(input).await.unwrap();
  assert!(matches!(out, IngestOutcome::Rejected { .. }));
}

#[tokio::test]
async fn second_kind_with_hint_links_to_existing_user() {
  let ing = ingestor().await;

  let first = ing
    .ingest(extraction(DocumentKind::Aadhaar, "1234 5678 9012", "Asha Rao"))
    .await
    .unwrap();
  let IngestOutcome::Created { user_id, .. } = first else { panic!() };

  // Upstream already resolved the person, so the PAN carries a user hint.
  let mut pan = extraction(DocumentKind::Pan, "ABCDE1234F", "Asha Rao");
  pan.user_hint = Some(user_id);
  let out = ing.ingest(pan).await.unwrap();

  let IngestOutcome::Linked { user_id: linked, .. } = out else {
    panic!("expected Linked, got {out:?}");
  };
  assert_eq!(linked, user_id);

  let user = ing.registry().lookup_by_user_id(user_id).await.unwrap().unwrap();
  assert_eq!(user.document_count, 2);
}

#[tokio::test]
async fn secondary_kind_without_hint_creates_numberless_user() {
  let ing = ingestor().await;

  let out = ing
    .ingest(extraction(DocumentKind::Pan, "ABCDE1234F", "Dev Patel"))
    .await
    .unwrap();
  let IngestOutcome::Created { user_id, .. } = out else {
    panic!("expected Created, got {out:?}");
  };

  let user = ing.registry().lookup_by_user_id(user_id).await.unwrap().unwrap();
  assert!(user.primary_identity_number.is_none());
  assert_eq!(user.document_count, 1);
}

#[tokio::test]
async fn hint_for_unknown_user_is_rejected() {
  let ing = ingestor().await;

  let mut input = extraction(DocumentKind::Pan, "ABCDE1234F", "Dev Patel");
  input.user_hint = Some(Uuid::new_v4());

  let out = ing.ingest(input).await.unwrap();
  assert!(matches!(out, IngestOutcome::Rejected { .. }));
}

#[tokio::test]
async fn concurrent_ingest_of_same_number_yields_one_winner() {
  let ing = std::sync::Arc::new(ingestor().await);

  let a = {
    let ing = ing.clone();
    tokio::spawn(async move {
      ing
        .ingest(extraction(DocumentKind::Aadhaar, "9999 8888 7777", "R. Singh"))
        .await
        .unwrap()
    })
  };
  let b = {
    let ing = ing.clone();
    tokio::spawn(async move {
      ing
        .ingest(extraction(DocumentKind::Aadhaar, "9999-8888-7777", "R. Singh"))
        .await
        .unwrap()
    })
  };

  let (a, b) = (a.await.unwrap(), b.await.unwrap());
  // Depending on which side wins the user and document races, the winner
  // reports Created (or Linked); the loser always observes a duplicate.
  let winners = [&a, &b]
    .iter()
    .filter(|o| {
      matches!(o, IngestOutcome::Created { .. } | IngestOutcome::Linked { .. })
    })
    .count();
  let duplicates = [&a, &b]
    .iter()
    .filter(|o| matches!(o, IngestOutcome::Duplicate { .. }))
    .count();
  assert_eq!(winners, 1, "exactly one winner, got {a:?} / {b:?}");
  assert_eq!(duplicates, 1, "exactly one Duplicate, got {a:?} / {b:?}");

  let stats = ing.user_statistics().await.unwrap();
  assert_eq!(stats.total_users, 1);
  assert_eq!(ing.store_for(DocumentKind::Aadhaar).count_documents().await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_secondary_ingest_creates_exactly_one_user() {
  let ing = std::sync::Arc::new(ingestor().await);

  // No hint, secondary kind: each side would mint a fresh user. The loser
  // must back off at the document insert without a user row of its own.
  let a = {
    let ing = ing.clone();
    tokio::spawn(async move {
      ing
        .ingest(extraction(DocumentKind::Pan, "ABCDE1234F", "Dev Patel"))
        .await
        .unwrap()
    })
  };
  let b = {
    let ing = ing.clone();
    tokio::spawn(async move {
      ing
        .ingest(extraction(DocumentKind::Pan, "abcde1234f", "Dev Patel"))
        .await
        .unwrap()
    })
  };

  let (a, b) = (a.await.unwrap(), b.await.unwrap());
  let created = [&a, &b]
    .iter()
    .filter(|o| matches!(o, IngestOutcome::Created { .. }))
    .count();
  let duplicates = [&a, &b]
    .iter()
    .filter(|o| matches!(o, IngestOutcome::Duplicate { .. }))
    .count();
  assert_eq!(created, 1, "exactly one Created, got {a:?} / {b:?}");
  assert_eq!(duplicates, 1, "exactly one Duplicate, got {a:?} / {b:?}");

  // No stranded numberless user from the losing side.
  let stats = ing.user_statistics().await.unwrap();
  assert_eq!(stats.total_users, 1);
  assert_eq!(ing.store_for(DocumentKind::Pan).count_documents().await.unwrap(), 1);
}

#[tokio::test]
async fn check_uniqueness_sees_registry_only_users() {
  let ing = ingestor().await;
  let n = aadhaar("1234 5678 9012");

  // A user exists but no document row does (e.g. migrated legacy data).
  ing
    .registry()
    .get_or_create_user(n.clone(), "Asha Rao".into())
    .await
    .unwrap();

  let check = ing.check_uniqueness(DocumentKind::Aadhaar, &n).await.unwrap();
  assert!(matches!(check, Uniqueness::Conflict(_)));
}

// ─── Reports & statistics ────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_report_is_clean_for_constrained_stores() {
  let ing = ingestor().await;

  ing
    .ingest(extraction(DocumentKind::Aadhaar, "1234 5678 9012", "Asha Rao"))
    .await
    .unwrap();
  ing
    .ingest(extraction(DocumentKind::Pan, "ABCDE1234F", "Dev Patel"))
    .await
    .unwrap();

  let report = ing.duplicate_report().await.unwrap();
  assert_eq!(report.total_duplicate_groups(), 0);
  let aadhaar_metrics = report
    .stores
    .iter()
    .find(|m| m.kind == DocumentKind::Aadhaar)
    .unwrap();
  assert_eq!(aadhaar_metrics.total_rows, 1);
  assert_eq!(aadhaar_metrics.duplicate_percentage(), 0.0);
}

#[tokio::test]
async fn user_statistics_counts_multi_document_users() {
  let r = registry().await;

  let (multi, _) = r
    .get_or_create_user(aadhaar("1234 5678 9012"), "Asha Rao".into())
    .await
    .unwrap();
  r.link(multi.user_id, DocumentKind::Aadhaar, 1).await.unwrap();
  r.link(multi.user_id, DocumentKind::Pan, 2).await.unwrap();

  let (single, _) = r
    .get_or_create_user(aadhaar("5555 4444 3333"), "Dev Patel".into())
    .await
    .unwrap();
  r.link(single.user_id, DocumentKind::Aadhaar, 3).await.unwrap();

  let stats = r.user_statistics().await.unwrap();
  assert_eq!(stats.total_users, 2);
  assert_eq!(stats.users_with_multiple_documents, 1);
}
