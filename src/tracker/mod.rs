//! Remote issue tracker access.

pub mod api_types;
pub mod client;
pub mod types;

use chrono::{DateTime, Utc};
use color_eyre::Result;

use api_types::{ApiComment, ApiIssue, ApiUser};

/// Operations the mirror needs from a remote tracker.
///
/// Calls are awaited one at a time; implementations need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait TrackerApi {
  /// All issues (any state), or only those updated since `since`.
  async fn list_issues(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ApiIssue>>;

  /// Comments of one issue, or only those updated since `since`.
  async fn list_comments(&self, number: u64, since: Option<DateTime<Utc>>)
    -> Result<Vec<ApiComment>>;

  /// A single issue, including fields the list endpoint omits.
  async fn get_issue(&self, number: u64) -> Result<ApiIssue>;

  /// Full profile for a user login.
  async fn get_user(&self, login: &str) -> Result<ApiUser>;

  /// Raw bytes of an attachment.
  async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>>;
}
