//! Aggregate a tracker's cached issues into a single file.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use crate::cache::{write_json, TrackerStore};
use crate::tracker::types::{IssueRecord, UserId, UserProfile};

/// Contents of the combined raw file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedData {
  pub repo_name: String,
  /// Newest issue first
  pub issues: Vec<IssueRecord>,
  pub users: BTreeMap<UserId, UserProfile>,
}

/// Collect every cached issue of the tracker, highest number first.
///
/// Returns `None` when the tracker has no cache yet.
pub fn collect(store: &TrackerStore) -> Result<Option<CombinedData>> {
  if !store.cache_dir().is_dir() {
    return Ok(None);
  }

  let mut numbers = store.issue_numbers()?;
  numbers.sort_unstable_by(|a, b| b.cmp(a));

  let mut issues = Vec::with_capacity(numbers.len());
  for number in numbers {
    if let Some(record) = store.load_issue(number)? {
      issues.push(record);
    }
  }

  Ok(Some(CombinedData {
    repo_name: store.name().to_string(),
    issues,
    users: store.load_users()?.into_profiles(),
  }))
}

/// Write the combined raw file; `None` when the tracker was skipped.
pub fn combine(store: &TrackerStore) -> Result<Option<PathBuf>> {
  let Some(data) = collect(store)? else {
    info!(
      tracker = store.name(),
      "Cache folder {} does not exist, skipping",
      store.cache_dir().display()
    );
    return Ok(None);
  };

  let path = store.raw_path();
  info!(
    tracker = store.name(),
    issues = data.issues.len(),
    "Writing combined data to {}",
    path.display()
  );
  write_json(&path, &data)?;
  Ok(Some(path))
}
