//! Incremental sync of one tracker into its cache.
//!
//! A pass lists the issues updated since the watermark, refreshes each one
//! whose remote copy is newer than the cached record, and advances the
//! watermark to the pass start only when every issue succeeded.

use chrono::{DateTime, SubsecRound, Utc};
use color_eyre::Result;
use tracing::{debug, error, info, warn};

use crate::assets::AssetMirror;
use crate::cache::{merge_by_key, needs_refresh, TrackerStore, UserTable, Watermark};
use crate::tracker::api_types::{ApiIssue, ApiUser, UserRefs};
use crate::tracker::types::UserId;
use crate::tracker::TrackerApi;

/// An issue that could not be synced in this pass.
#[derive(Debug, Clone)]
pub struct IssueFailure {
  pub number: u64,
  pub error: String,
}

/// Summary of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
  /// Issues returned by the listing
  pub fetched: usize,
  pub written: usize,
  /// Issues whose cached record was already current
  pub skipped: usize,
  pub comments_added: usize,
  pub comments_replaced: usize,
  pub assets_downloaded: usize,
  pub users_added: usize,
  pub failed: Vec<IssueFailure>,
  /// Failures not tied to one issue, such as writing the user table
  pub errors: Vec<String>,
  pub watermark_advanced: bool,
}

enum IssueOutcome {
  Skipped,
  Written {
    comments_added: usize,
    comments_replaced: usize,
    assets_downloaded: usize,
  },
}

/// Runs sync passes for one tracker.
pub struct Syncer<'a, A: TrackerApi> {
  api: &'a A,
  store: &'a TrackerStore,
  assets: &'a AssetMirror,
  fetch_full_profiles: bool,
}

impl<'a, A: TrackerApi> Syncer<'a, A> {
  pub fn new(api: &'a A, store: &'a TrackerStore, assets: &'a AssetMirror) -> Self {
    Self {
      api,
      store,
      assets,
      fetch_full_profiles: false,
    }
  }

  /// Fetch the full profile of newly seen users.
  pub fn with_full_profiles(mut self, enabled: bool) -> Self {
    self.fetch_full_profiles = enabled;
    self
  }

  /// Run one pass.
  ///
  /// A failure listing issues aborts the pass. A failure inside one issue, or
  /// in writing the user table, is recorded in the report and the pass goes
  /// on, but the watermark then stays where it was so the next pass retries
  /// the same window.
  pub async fn sync(&self, users: &mut UserTable, watermark: &mut Watermark) -> Result<SyncReport> {
    let pass_start = Utc::now().trunc_subsecs(0);
    let since = watermark.since();
    let users_before = users.len();

    info!(tracker = self.store.name(), since = ?since, "Fetching issues");
    let issues = self.api.list_issues(since).await?;

    let mut report = SyncReport {
      fetched: issues.len(),
      ..Default::default()
    };

    for issue in issues {
      let number = issue.number;
      match self.sync_issue(issue, users).await {
        Ok(IssueOutcome::Skipped) => report.skipped += 1,
        Ok(IssueOutcome::Written {
          comments_added,
          comments_replaced,
          assets_downloaded,
        }) => {
          report.written += 1;
          report.comments_added += comments_added;
          report.comments_replaced += comments_replaced;
          report.assets_downloaded += assets_downloaded;
        }
        Err(e) => {
          error!(tracker = self.store.name(), issue = number, error = %e, "Failed to sync issue");
          report.failed.push(IssueFailure {
            number,
            error: e.to_string(),
          });
        }
      }

      let pending = users.pending();
      match self.store.flush_users(users) {
        Ok(true) => info!(tracker = self.store.name(), count = pending, "Updated user table"),
        Ok(false) => {}
        Err(e) => {
          error!(tracker = self.store.name(), error = %e, "Failed to write user table");
          report.errors.push(e.to_string());
        }
      }
    }

    report.users_added = users.len() - users_before;

    if report.failed.is_empty() && report.errors.is_empty() {
      let advanced = Watermark::at(pass_start);
      match self.store.store_watermark(&advanced) {
        Ok(()) => {
          *watermark = advanced;
          report.watermark_advanced = true;
        }
        Err(e) => {
          error!(tracker = self.store.name(), error = %e, "Failed to write watermark");
          report.errors.push(e.to_string());
        }
      }
    } else {
      warn!(
        tracker = self.store.name(),
        failed = report.failed.len(),
        errors = report.errors.len(),
        "Watermark not advanced; this window will be retried next pass"
      );
    }

    Ok(report)
  }

  async fn sync_issue(&self, mut issue: ApiIssue, users: &mut UserTable) -> Result<IssueOutcome> {
    let number = issue.number;
    let cached = self.store.load_issue(number)?;

    if !needs_refresh(cached.as_ref(), issue.updated_at) {
      debug!(issue = number, "Issue unchanged, skipping");
      return Ok(IssueOutcome::Skipped);
    }

    info!(
      issue = number,
      title = %issue.title,
      comments = issue.comment_count,
      "Processing issue"
    );

    // The list endpoint leaves out who closed an issue
    if issue.is_closed() && issue.closed_by.is_none() {
      issue.closed_by = self.api.get_issue(number).await?.closed_by;
    }

    // Issue references are interned before comment authors, so the issue's
    // snapshot of a user is the one kept
    let mut assignees = Vec::with_capacity(issue.assignees.len());
    for assignee in std::mem::take(&mut issue.assignees) {
      assignees.push(self.intern(assignee, users).await);
    }
    let refs = UserRefs {
      author: self.intern_opt(issue.user.take(), users).await,
      assignee: self.intern_opt(issue.assignee.take(), users).await,
      assignees,
      closed_by: self.intern_opt(issue.closed_by.take(), users).await,
    };

    let comments_since: Option<DateTime<Utc>> = cached.as_ref().map(|c| c.updated_at);
    let remote_comments = self.api.list_comments(number, comments_since).await?;

    let mut assets_downloaded = self.assets.mirror(self.api, issue.body.as_deref()).await;

    let mut fetched = Vec::with_capacity(remote_comments.len());
    for mut comment in remote_comments {
      assets_downloaded += self.assets.mirror(self.api, comment.body.as_deref()).await;
      let author = self.intern_opt(comment.user.take(), users).await;
      fetched.push(comment.into_record(author));
    }

    let mut comments = cached.map(|c| c.comments).unwrap_or_default();
    let stats = merge_by_key(&mut comments, fetched);

    let record = issue.into_record(refs, comments);
    self.store.store_issue(&record)?;

    Ok(IssueOutcome::Written {
      comments_added: stats.added,
      comments_replaced: stats.replaced,
      assets_downloaded,
    })
  }

  async fn intern_opt(&self, user: Option<ApiUser>, users: &mut UserTable) -> Option<UserId> {
    match user {
      Some(user) => Some(self.intern(user, users).await),
      None => None,
    }
  }

  async fn intern(&self, user: ApiUser, users: &mut UserTable) -> UserId {
    if users.contains(user.id) || !self.fetch_full_profiles {
      return users.intern(user.into());
    }

    match self.api.get_user(&user.login).await {
      Ok(full) if full.id == user.id => users.intern(full.into()),
      Ok(full) => {
        warn!(
          login = %user.login,
          expected = user.id,
          got = full.id,
          "Profile id mismatch, keeping embedded reference"
        );
        users.intern(user.into())
      }
      Err(e) => {
        warn!(
          login = %user.login,
          error = %e,
          "Failed to fetch profile, keeping embedded reference"
        );
        users.intern(user.into())
      }
    }
  }
}
