//! Records as they are persisted in the per-tracker cache.
//!
//! Fields the mirror does not interpret are kept verbatim in `extra` so a
//! cached record carries everything the tracker sent.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Numeric user identifier, unique per tracker host.
pub type UserId = u64;

/// Remaining fields of a remote payload, in deterministic key order.
pub type ExtraFields = BTreeMap<String, Value>;

/// A user profile stored once in the user table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
  pub id: UserId,
  pub login: String,
  #[serde(flatten)]
  pub extra: ExtraFields,
}

/// A comment embedded in its issue record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
  pub id: u64,
  pub body: Option<String>,
  /// Author reference into the user table
  pub user: Option<UserId>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(flatten)]
  pub extra: ExtraFields,
}

/// One cached issue, stored as `<number>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
  pub number: u64,
  pub title: String,
  pub body: Option<String>,
  pub state: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub closed_at: Option<DateTime<Utc>>,
  pub user: Option<UserId>,
  pub assignee: Option<UserId>,
  #[serde(default)]
  pub assignees: Vec<UserId>,
  pub closed_by: Option<UserId>,
  /// Comments in the order they were first seen
  #[serde(default)]
  pub comments: Vec<CommentRecord>,
  #[serde(flatten)]
  pub extra: ExtraFields,
}

/// Format a timestamp the way the tracker API expects it (`YYYY-MM-DDTHH:MM:SSZ`).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
