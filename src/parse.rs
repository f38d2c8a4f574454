//! Flatten the combined file into display-ready data.
//!
//! User ids become logins, timestamps become dates, attachment links point at
//! the mirrored copies. Markdown is left as is for the renderer.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use crate::assets::AssetMirror;
use crate::cache::{read_json, write_json, TrackerStore, UserTable};
use crate::combine::CombinedData;
use crate::tracker::types::{CommentRecord, ExtraFields, IssueRecord, UserId, UserProfile};

/// Body shown for issues without a description.
pub const MISSING_BODY: &str = "No description provided.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedData {
  pub repo_name: String,
  pub issues: Vec<ParsedIssue>,
  pub users: BTreeMap<UserId, UserProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedIssue {
  pub number: u64,
  pub title: String,
  pub body: String,
  pub state: String,
  pub user: Option<String>,
  pub assignee: Option<String>,
  pub assignees: Vec<String>,
  pub created_at: String,
  pub updated_at: String,
  pub closed_at: Option<String>,
  pub closed_by: Option<String>,
  pub comments: Vec<ParsedComment>,
  #[serde(flatten)]
  pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedComment {
  pub id: u64,
  pub body: String,
  pub user: Option<String>,
  pub created_at: String,
  pub updated_at: String,
  #[serde(flatten)]
  pub extra: ExtraFields,
}

fn display_date(ts: DateTime<Utc>) -> String {
  ts.format("%d.%m.%Y").to_string()
}

/// Resolves ids and links while flattening.
struct Flattener<'a> {
  users: &'a UserTable,
  assets: &'a AssetMirror,
  link_dir: &'a str,
}

impl Flattener<'_> {
  fn user(&self, id: UserId) -> String {
    self
      .users
      .login(id)
      .map(String::from)
      .unwrap_or_else(|| format!("User-{}", id))
  }

  fn body(&self, body: &str) -> String {
    self.assets.rewrite_links(body, self.link_dir)
  }

  fn issue(&self, issue: IssueRecord) -> ParsedIssue {
    let body = match issue.body.as_deref() {
      Some(body) if !body.trim().is_empty() => self.body(body),
      _ => MISSING_BODY.to_string(),
    };

    ParsedIssue {
      number: issue.number,
      title: issue.title,
      body,
      state: issue.state,
      user: issue.user.map(|id| self.user(id)),
      assignee: issue.assignee.map(|id| self.user(id)),
      assignees: issue.assignees.into_iter().map(|id| self.user(id)).collect(),
      created_at: display_date(issue.created_at),
      updated_at: display_date(issue.updated_at),
      closed_at: issue.closed_at.map(display_date),
      closed_by: issue.closed_by.map(|id| self.user(id)),
      comments: issue.comments.into_iter().map(|c| self.comment(c)).collect(),
      extra: issue.extra,
    }
  }

  fn comment(&self, comment: CommentRecord) -> ParsedComment {
    ParsedComment {
      id: comment.id,
      body: comment.body.as_deref().map(|b| self.body(b)).unwrap_or_default(),
      user: comment.user.map(|id| self.user(id)),
      created_at: display_date(comment.created_at),
      updated_at: display_date(comment.updated_at),
      extra: comment.extra,
    }
  }
}

/// Flatten combined data; attachment links are rewritten to `link_dir`.
pub fn flatten(data: CombinedData, assets: &AssetMirror, link_dir: &str) -> ParsedData {
  let users = UserTable::from_profiles(data.users);
  let flattener = Flattener {
    users: &users,
    assets,
    link_dir,
  };
  let issues = data
    .issues
    .into_iter()
    .map(|issue| flattener.issue(issue))
    .collect();

  ParsedData {
    repo_name: data.repo_name,
    issues,
    users: users.into_profiles(),
  }
}

/// Write the parsed file; `None` when the combined file is missing.
pub fn parse(store: &TrackerStore, assets: &AssetMirror) -> Result<Option<PathBuf>> {
  let raw_path = store.raw_path();
  let Some(data) = read_json::<CombinedData>(&raw_path)? else {
    info!(
      tracker = store.name(),
      "Combined data file {} does not exist, skipping",
      raw_path.display()
    );
    return Ok(None);
  };

  let parsed = flatten(data, assets, store.assets_link_dir());
  let path = store.parsed_path();
  info!(tracker = store.name(), "Writing parsed issue data to {}", path.display());
  write_json(&path, &parsed)?;
  Ok(Some(path))
}
