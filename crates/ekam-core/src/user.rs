//! User — the single durable record for a natural person.
//!
//! One user per person, keyed by a random `user_id` that is never reused.
//! The normalized primary identity number, when present, is unique across
//! the whole user set (enforced by the registry store's unique constraint).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::IdentityNumber;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub user_id:                 Uuid,
  /// Absent for users known only by a secondary document kind.
  pub primary_identity_number: Option<IdentityNumber>,
  /// The name captured from the first document processed for this user;
  /// never overwritten by later documents.
  pub primary_name:            String,
  pub created_at:              DateTime<Utc>,
  pub updated_at:              DateTime<Utc>,
  /// Count of linked documents, maintained by the cross-reference linker.
  pub document_count:          i64,
}

/// Aggregate user counts for the administrative surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatistics {
  pub total_users:                   i64,
  pub users_with_multiple_documents: i64,
}
