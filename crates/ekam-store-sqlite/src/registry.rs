//! [`SqliteRegistry`] — the SQLite implementation of [`RegistryStore`].

use std::{
  collections::HashMap,
  path::Path,
  sync::{Arc, Mutex},
};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use ekam_core::{
  identity::{DocumentKind, IdentityNumber},
  link::CrossReference,
  outcome::LinkOutcome,
  store::RegistryStore,
  user::{User, UserStatistics},
};

use crate::{
  encode::{encode_dt, encode_kind, encode_uuid, RawCrossReference, RawUser},
  schema::REGISTRY_SCHEMA,
  Error, Result,
};

/// Identity-number → user cache entries kept before wholesale eviction.
/// The store stays authoritative: every miss goes to SQLite.
const CACHE_CAP: usize = 1024;

// ─── Store ───────────────────────────────────────────────────────────────────

/// The identity registry backed by a single SQLite file, plus a bounded
/// read-through cache keyed on the normalized identity number.
///
/// Cloning is cheap — the inner connection and cache are reference-counted.
#[derive(Clone)]
pub struct SqliteRegistry {
  conn:  tokio_rusqlite::Connection,
  cache: Arc<Mutex<HashMap<String, User>>>,
}

impl SqliteRegistry {
  /// Open (or create) a registry at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, cache: Arc::new(Mutex::new(HashMap::new())) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory registry — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, cache: Arc::new(Mutex::new(HashMap::new())) };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(REGISTRY_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Cache ─────────────────────────────────────────────────────────────────

  fn cache_get(&self, number: &IdentityNumber) -> Option<User> {
    self.cache.lock().expect("cache lock").get(number.as_str()).cloned()
  }

  fn cache_put(&self, user: &User) {
    let Some(number) = &user.primary_identity_number else { return };
    let mut cache = self.cache.lock().expect("cache lock");
    if cache.len() >= CACHE_CAP && !cache.contains_key(number.as_str()) {
      cache.clear();
    }
    cache.insert(number.as_str().to_owned(), user.clone());
  }

  fn cache_invalidate_user(&self, user_id: Uuid) {
    let mut cache = self.cache.lock().expect("cache lock");
    cache.retain(|_, u| u.user_id != user_id);
  }

  // ── Raw reads ─────────────────────────────────────────────────────────────

  async fn fetch_by_number(&self, number: &IdentityNumber) -> Result<Option<User>> {
    let number_str = number.as_str().to_owned();

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT user_id, primary_identity_number, primary_name,
                    created_at, updated_at, document_count
             FROM users WHERE primary_identity_number = ?1",
            rusqlite::params![number_str],
            map_user_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }
}

/// Map one `users` row (selected in the canonical column order) to
/// [`RawUser`].
fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
  Ok(RawUser {
    user_id:                 row.get(0)?,
    primary_identity_number: row.get(1)?,
    primary_name:            row.get(2)?,
    created_at:              row.get(3)?,
    updated_at:              row.get(4)?,
    document_count:          row.get(5)?,
  })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(err, _)
      if err.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

// ─── RegistryStore impl ──────────────────────────────────────────────────────

impl RegistryStore for SqliteRegistry {
  type Error = Error;

  async fn get_or_create_user(
    &self,
    number: IdentityNumber,
    name: String,
  ) -> Result<(User, bool)> {
    // Attempt the insert first; the unique constraint on
    // primary_identity_number arbitrates concurrent callers. Losing the
    // race falls through to a re-read of the winner inside the same
    // connection call.
    let candidate_id = encode_uuid(Uuid::new_v4());
    let now_str = encode_dt(Utc::now());
    let number_str = number.as_str().to_owned();
    let name_trimmed = name.trim().to_owned();

    let (raw, created): (RawUser, bool) = self
      .conn
      .call(move |conn| {
        let inserted = conn.execute(
          "INSERT INTO users (user_id, primary_identity_number, primary_name,
                              created_at, updated_at, document_count)
           VALUES (?1, ?2, ?3, ?4, ?4, 0)",
          rusqlite::params![candidate_id, number_str, name_trimmed, now_str],
        );

        match inserted {
          Ok(_) => {
            let raw = conn.query_row(
              "SELECT user_id, primary_identity_number, primary_name,
                      created_at, updated_at, document_count
               FROM users WHERE user_id = ?1",
              rusqlite::params![candidate_id],
              map_user_row,
            )?;
            Ok((raw, true))
          }
          Err(e) if is_unique_violation(&e) => {
            // Another caller created this user first; their name wins.
            let raw = conn.query_row(
              "SELECT user_id, primary_identity_number, primary_name,
                      created_at, updated_at, document_count
               FROM users WHERE primary_identity_number = ?1",
              rusqlite::params![number_str],
              map_user_row,
            )?;
            Ok((raw, false))
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    let user = raw.into_user()?;
    self.cache_put(&user);
    Ok((user, created))
  }

  async fn create_user(&self, user_id: Uuid, name: String) -> Result<User> {
    let id_str = encode_uuid(user_id);
    let now_str = encode_dt(Utc::now());
    let name_trimmed = name.trim().to_owned();

    let raw: RawUser = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (user_id, primary_identity_number, primary_name,
                              created_at, updated_at, document_count)
           VALUES (?1, NULL, ?2, ?3, ?3, 0)",
          rusqlite::params![id_str, name_trimmed, now_str],
        )?;
        let raw = conn.query_row(
          "SELECT user_id, primary_identity_number, primary_name,
                  created_at, updated_at, document_count
           FROM users WHERE user_id = ?1",
          rusqlite::params![id_str],
          map_user_row,
        )?;
        Ok(raw)
      })
      .await?;

    raw.into_user()
  }

  async fn user_exists(&self, number: &IdentityNumber) -> Result<bool> {
    Ok(self.lookup_by_identity_number(number).await?.is_some())
  }

  async fn lookup_by_identity_number(
    &self,
    number: &IdentityNumber,
  ) -> Result<Option<User>> {
    if let Some(user) = self.cache_get(number) {
      return Ok(Some(user));
    }

    let user = self.fetch_by_number(number).await?;
    if let Some(u) = &user {
      self.cache_put(u);
    }
    Ok(user)
  }

  async fn lookup_by_user_id(&self, user_id: Uuid) -> Result<Option<User>> {
    let id_str = encode_uuid(user_id);

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT user_id, primary_identity_number, primary_name,
                    created_at, updated_at, document_count
             FROM users WHERE user_id = ?1",
            rusqlite::params![id_str],
            map_user_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn link(
    &self,
    user_id: Uuid,
    kind: DocumentKind,
    document_id: i64,
  ) -> Result<LinkOutcome> {
    let id_str = encode_uuid(user_id);
    let kind_str = encode_kind(kind).to_owned();
    let now_str = encode_dt(Utc::now());

    // Insert + count bump are one transaction: both commit or neither does.
    let (raw, already_linked): (RawCrossReference, bool) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let existing: Option<RawCrossReference> = tx
          .query_row(
            "SELECT user_id, document_kind, document_id, linked_at
             FROM cross_references
             WHERE user_id = ?1 AND document_kind = ?2",
            rusqlite::params![id_str, kind_str],
            |row| {
              Ok(RawCrossReference {
                user_id:       row.get(0)?,
                document_kind: row.get(1)?,
                document_id:   row.get(2)?,
                linked_at:     row.get(3)?,
              })
            },
          )
          .optional()?;

        if let Some(existing) = existing {
          // Same document: idempotent no-op. Different document: policy
          // violation, nothing written either way.
          tx.commit()?;
          let conflicting = existing.document_id != document_id;
          return Ok((existing, conflicting));
        }

        tx.execute(
          "INSERT INTO cross_references (user_id, document_kind, document_id, linked_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, kind_str, document_id, now_str],
        )?;
        tx.execute(
          "UPDATE users
           SET document_count = document_count + 1, updated_at = ?2
           WHERE user_id = ?1",
          rusqlite::params![id_str, now_str],
        )?;
        tx.commit()?;

        Ok((
          RawCrossReference {
            user_id:       id_str,
            document_kind: kind_str,
            document_id,
            linked_at:     now_str,
          },
          false,
        ))
      })
      .await?;

    let link = raw.into_link()?;
    // document_count may have changed; drop any cached copy of this user.
    self.cache_invalidate_user(user_id);

    if already_linked {
      return Ok(LinkOutcome::AlreadyLinked { existing: link });
    }
    Ok(LinkOutcome::Linked(link))
  }

  async fn get_link(
    &self,
    user_id: Uuid,
    kind: DocumentKind,
  ) -> Result<Option<CrossReference>> {
    let id_str = encode_uuid(user_id);
    let kind_str = encode_kind(kind).to_owned();

    let raw: Option<RawCrossReference> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT user_id, document_kind, document_id, linked_at
             FROM cross_references
             WHERE user_id = ?1 AND document_kind = ?2",
            rusqlite::params![id_str, kind_str],
            |row| {
              Ok(RawCrossReference {
                user_id:       row.get(0)?,
                document_kind: row.get(1)?,
                document_id:   row.get(2)?,
                linked_at:     row.get(3)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCrossReference::into_link).transpose()
  }

  async fn user_statistics(&self) -> Result<UserStatistics> {
    let (total, multi): (i64, i64) = self
      .conn
      .call(|conn| {
        let total: i64 =
          conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
        let multi: i64 = conn.query_row(
          "SELECT COUNT(*) FROM users WHERE document_count > 1",
          [],
          |r| r.get(0),
        )?;
        Ok((total, multi))
      })
      .await?;

    Ok(UserStatistics { total_users: total, users_with_multiple_documents: multi })
  }
}
