//! Cross-references — the link table tying a user to at most one document
//! per document kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::DocumentKind;

/// One row of the link table. `(user_id, kind)` is unique, so a user can
/// never hold two documents of the same kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossReference {
  pub user_id:     Uuid,
  pub kind:        DocumentKind,
  pub document_id: i64,
  pub linked_at:   DateTime<Utc>,
}
