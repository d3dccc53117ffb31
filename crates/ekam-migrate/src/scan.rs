//! Duplicate-group scanning over an unconstrained document store.

use std::cmp::Reverse;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::Result;

/// Minimal view of a document row used for survivor selection.
#[derive(Debug, Clone)]
pub struct GroupRow {
  pub document_id:      i64,
  pub non_empty_fields: usize,
  pub ingested_at:      DateTime<Utc>,
}

/// All duplicate groups in the store, keyed by normalized identity number.
/// Rows within each group come back in `document_id` order.
pub fn duplicate_groups(
  conn: &rusqlite::Connection,
) -> Result<Vec<(String, Vec<GroupRow>)>> {
  let mut stmt = conn.prepare(
    "SELECT identity_number, document_id, fields_json, ingested_at
     FROM documents
     WHERE identity_number IN (
       SELECT identity_number FROM documents
       GROUP BY identity_number HAVING COUNT(*) > 1
     )
     ORDER BY identity_number, document_id",
  )?;

  let rows = stmt
    .query_map([], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, i64>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut groups: Vec<(String, Vec<GroupRow>)> = Vec::new();
  for (number, document_id, fields_json, ingested_at) in rows {
    let row = GroupRow {
      document_id,
      non_empty_fields: non_empty_count(&fields_json),
      ingested_at: parse_timestamp(&ingested_at),
    };
    match groups.last_mut() {
      Some((last, members)) if *last == number => members.push(row),
      _ => groups.push((number, vec![row])),
    }
  }
  Ok(groups)
}

/// Pick the survivor of a duplicate group: most populated fields, then most
/// recent ingestion, then lowest row id as the final tie-break.
pub fn select_survivor(group: &[GroupRow]) -> &GroupRow {
  group
    .iter()
    .max_by_key(|r| (r.non_empty_fields, r.ingested_at, Reverse(r.document_id)))
    .expect("duplicate group is never empty")
}

/// Count of non-empty field values in a stored fields blob. Rows with
/// unparseable fields score zero so a healthy duplicate wins over them.
fn non_empty_count(fields_json: &str) -> usize {
  match serde_json::from_str::<serde_json::Value>(fields_json) {
    Ok(serde_json::Value::Object(map)) => map
      .values()
      .filter(|v| match v {
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Null => false,
        _ => true,
      })
      .count(),
    _ => 0,
  }
}

/// Legacy stores carry a mix of RFC 3339 and bare `YYYY-MM-DD HH:MM:SS`
/// timestamps. Unparseable values sort to the epoch, never failing a scan.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return dt.with_timezone(&Utc);
  }
  if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
    return naive.and_utc();
  }
  DateTime::<Utc>::MIN_UTC
}

#[cfg(test)]
mod test {
  use chrono::TimeZone;

  use super::*;

  fn row(document_id: i64, non_empty: usize, ts: &str) -> GroupRow {
    GroupRow {
      document_id,
      non_empty_fields: non_empty,
      ingested_at: parse_timestamp(ts),
    }
  }

  #[test]
  fn most_complete_row_survives() {
    let group = vec![
      row(1, 2, "2024-01-01T00:00:00Z"),
      row(2, 4, "2023-06-01T00:00:00Z"),
      row(3, 3, "2024-03-01T00:00:00Z"),
    ];
    assert_eq!(select_survivor(&group).document_id, 2);
  }

  #[test]
  fn recency_breaks_completeness_ties() {
    let group = vec![
      row(1, 2, "2024-01-01T00:00:00Z"),
      row(2, 2, "2024-02-01T00:00:00Z"),
    ];
    assert_eq!(select_survivor(&group).document_id, 2);
  }

  #[test]
  fn lowest_id_breaks_full_ties() {
    let group = vec![
      row(7, 1, "2024-01-01T00:00:00Z"),
      row(3, 1, "2024-01-01T00:00:00Z"),
      row(5, 1, "2024-01-01T00:00:00Z"),
    ];
    assert_eq!(select_survivor(&group).document_id, 3);
  }

  #[test]
  fn legacy_timestamp_format_parses() {
    let dt = parse_timestamp("2024-05-10 14:30:00");
    assert_eq!(dt, Utc.with_ymd_and_hms(2024, 5, 10, 14, 30, 0).unwrap());
  }

  #[test]
  fn garbage_timestamp_sorts_last() {
    let group = vec![row(1, 1, "not a date"), row(2, 1, "2020-01-01T00:00:00Z")];
    assert_eq!(select_survivor(&group).document_id, 2);
  }

  #[test]
  fn garbage_fields_score_zero() {
    assert_eq!(non_empty_count("not json"), 0);
    assert_eq!(non_empty_count(r#"{"name": "A", "dob": "", "gender": null}"#), 1);
  }
}
