//! Core traits and helpers for the incremental cache.

use chrono::{DateTime, Utc};

use crate::tracker::types::{CommentRecord, IssueRecord};

/// Trait for entities that can be cached and refreshed incrementally.
///
/// Implementors provide a key that is unique within their container and the
/// remote last-modification timestamp used for staleness checks.
pub trait Cacheable {
  type Key: PartialEq;

  /// Unique identifier for this entity (e.g. issue number, comment id)
  fn cache_key(&self) -> Self::Key;

  /// Last modification timestamp reported by the tracker.
  fn updated_at(&self) -> DateTime<Utc>;
}

impl Cacheable for IssueRecord {
  type Key = u64;

  fn cache_key(&self) -> u64 {
    self.number
  }

  fn updated_at(&self) -> DateTime<Utc> {
    self.updated_at
  }
}

impl Cacheable for CommentRecord {
  type Key = u64;

  fn cache_key(&self) -> u64 {
    self.id
  }

  fn updated_at(&self) -> DateTime<Utc> {
    self.updated_at
  }
}

/// Whether a remote copy must be fetched again given the cached one.
pub fn needs_refresh<T: Cacheable>(cached: Option<&T>, remote_updated: DateTime<Utc>) -> bool {
  match cached {
    Some(entity) => remote_updated > entity.updated_at(),
    None => true,
  }
}

/// Counts produced by [`merge_by_key`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
  pub added: usize,
  pub replaced: usize,
}

/// Upsert `incoming` into `existing` by cache key.
///
/// A matching entry is replaced at its index; unknown entries are appended,
/// so the sequence keeps first-seen order.
pub fn merge_by_key<T: Cacheable>(existing: &mut Vec<T>, incoming: Vec<T>) -> MergeStats {
  let mut stats = MergeStats::default();

  for entity in incoming {
    let key = entity.cache_key();
    match existing.iter().position(|e| e.cache_key() == key) {
      Some(index) => {
        existing[index] = entity;
        stats.replaced += 1;
      }
      None => {
        existing.push(entity);
        stats.added += 1;
      }
    }
  }

  stats
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn comment(id: u64, body: &str, day: u32) -> CommentRecord {
    let ts = Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap();
    CommentRecord {
      id,
      body: Some(body.to_string()),
      user: Some(1),
      created_at: ts,
      updated_at: ts,
      extra: Default::default(),
    }
  }

  #[test]
  fn test_merge_replaces_in_place_and_appends() {
    let mut comments = vec![comment(1, "A", 1), comment(2, "B", 2)];
    let stats = merge_by_key(&mut comments, vec![comment(1, "A edited", 3), comment(3, "C", 3)]);

    let bodies: Vec<&str> = comments.iter().filter_map(|c| c.body.as_deref()).collect();
    assert_eq!(bodies, vec!["A edited", "B", "C"]);
    assert_eq!(stats, MergeStats { added: 1, replaced: 1 });
  }

  #[test]
  fn test_merge_does_not_resort_by_time() {
    let mut comments = vec![comment(10, "late", 9)];
    merge_by_key(&mut comments, vec![comment(5, "early", 1)]);

    let ids: Vec<u64> = comments.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![10, 5]);
  }

  #[test]
  fn test_merge_same_batch_twice_is_stable() {
    let mut comments = vec![comment(1, "A", 1)];
    let batch = vec![comment(1, "A", 1), comment(2, "B", 2)];
    merge_by_key(&mut comments, batch.clone());
    let stats = merge_by_key(&mut comments, batch);

    assert_eq!(comments.len(), 2);
    assert_eq!(stats, MergeStats { added: 0, replaced: 2 });
  }

  #[test]
  fn test_needs_refresh() {
    let cached = comment(1, "A", 5);
    let same = cached.updated_at;
    let newer = Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap();

    assert!(needs_refresh::<CommentRecord>(None, same));
    assert!(!needs_refresh(Some(&cached), same));
    assert!(needs_refresh(Some(&cached), newer));
  }
}
