//! Serde-deserializable types matching GitHub REST API responses.
//!
//! These types are separate from the cached records: user references arrive
//! as embedded objects and are replaced by ids once interned.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::types::{CommentRecord, ExtraFields, IssueRecord, UserId, UserProfile};

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
  pub id: UserId,
  pub login: String,
  #[serde(flatten)]
  pub extra: ExtraFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiIssue {
  pub number: u64,
  #[serde(default)]
  pub title: String,
  pub body: Option<String>,
  #[serde(default)]
  pub state: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub closed_at: Option<DateTime<Utc>>,
  pub user: Option<ApiUser>,
  pub assignee: Option<ApiUser>,
  #[serde(default)]
  pub assignees: Vec<ApiUser>,
  /// Only present on the single-issue endpoint
  pub closed_by: Option<ApiUser>,
  /// Comment count; the cached record stores the comments themselves
  #[serde(default, rename = "comments")]
  pub comment_count: u64,
  #[serde(flatten)]
  pub extra: ExtraFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiComment {
  pub id: u64,
  pub body: Option<String>,
  pub user: Option<ApiUser>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(flatten)]
  pub extra: ExtraFields,
}

// ============================================================================
// Conversions to cached records
// ============================================================================

/// User references of an issue after interning.
#[derive(Debug, Clone, Default)]
pub struct UserRefs {
  pub author: Option<UserId>,
  pub assignee: Option<UserId>,
  pub assignees: Vec<UserId>,
  pub closed_by: Option<UserId>,
}

impl ApiIssue {
  pub fn is_closed(&self) -> bool {
    self.state == "closed"
  }

  pub fn into_record(self, refs: UserRefs, comments: Vec<CommentRecord>) -> IssueRecord {
    IssueRecord {
      number: self.number,
      title: self.title,
      body: self.body,
      state: self.state,
      created_at: self.created_at,
      updated_at: self.updated_at,
      closed_at: self.closed_at,
      user: refs.author,
      assignee: refs.assignee,
      assignees: refs.assignees,
      closed_by: refs.closed_by,
      comments,
      extra: self.extra,
    }
  }
}

impl ApiComment {
  pub fn into_record(self, author: Option<UserId>) -> CommentRecord {
    CommentRecord {
      id: self.id,
      body: self.body,
      user: author,
      created_at: self.created_at,
      updated_at: self.updated_at,
      extra: self.extra,
    }
  }
}

impl From<ApiUser> for UserProfile {
  fn from(user: ApiUser) -> Self {
    UserProfile {
      id: user.id,
      login: user.login,
      extra: user.extra,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_list_payload_without_closed_by() {
    let issue: ApiIssue = serde_json::from_value(json!({
      "id": 99001,
      "number": 3,
      "title": "Broken link",
      "body": "See ![Image](https://github.com/user-attachments/assets/abc)",
      "state": "closed",
      "created_at": "2024-01-01T00:00:00Z",
      "updated_at": "2024-01-05T00:00:00Z",
      "closed_at": "2024-01-05T00:00:00Z",
      "user": {"id": 1, "login": "octocat", "type": "User"},
      "assignee": null,
      "assignees": [],
      "comments": 4
    }))
    .unwrap();

    assert!(issue.is_closed());
    assert!(issue.closed_by.is_none());
    assert_eq!(issue.comment_count, 4);
    assert_eq!(issue.user.as_ref().unwrap().extra["type"], "User");
    assert!(issue.extra.contains_key("id"));
    assert!(!issue.extra.contains_key("comments"));
  }

  #[test]
  fn test_into_record_keeps_refs_and_extra() {
    let issue: ApiIssue = serde_json::from_value(json!({
      "number": 8,
      "title": "Feature",
      "body": null,
      "state": "open",
      "created_at": "2024-01-01T00:00:00Z",
      "updated_at": "2024-01-02T00:00:00Z",
      "closed_at": null,
      "user": {"id": 1, "login": "octocat"},
      "html_url": "https://github.com/acme/widgets/issues/8"
    }))
    .unwrap();

    let refs = UserRefs {
      author: Some(1),
      assignees: vec![2, 3],
      ..Default::default()
    };
    let record = issue.into_record(refs, Vec::new());

    assert_eq!(record.user, Some(1));
    assert_eq!(record.assignees, vec![2, 3]);
    assert_eq!(
      record.extra["html_url"],
      "https://github.com/acme/widgets/issues/8"
    );
  }
}
