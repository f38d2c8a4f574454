use crate::config::{GithubConfig, TrackerConfig};
use crate::tracker::api_types::{ApiComment, ApiIssue, ApiUser};
use crate::tracker::types::format_timestamp;
use crate::tracker::TrackerApi;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("issue-mirror/", env!("CARGO_PKG_VERSION"));
const DEFAULT_PAGE_SIZE: u32 = 100;
const API_MEDIA_TYPE: &str = "application/vnd.github+json";
const ANY_MEDIA_TYPE: &str = "*/*";

/// GitHub REST API client for a single repository.
#[derive(Clone)]
pub struct GithubClient {
  http: reqwest::Client,
  api_url: Url,
  owner: String,
  repo: String,
  token: String,
  /// Assets below this prefix are fetched with the token
  attachment_prefix: String,
  page_size: u32,
}

impl GithubClient {
  pub fn new(
    github: &GithubConfig,
    tracker: &TrackerConfig,
    token: &str,
    attachment_prefix: &str,
  ) -> Result<Self> {
    // A trailing slash keeps path prefixes such as /api/v3 when joining
    let mut base = github.api_url.clone();
    if !base.ends_with('/') {
      base.push('/');
    }
    let api_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid API URL {}: {}", github.api_url, e))?;

    let http = reqwest::Client::builder()
      .user_agent(USER_AGENT)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      api_url,
      owner: tracker.owner.clone(),
      repo: tracker.repo.clone(),
      token: token.to_string(),
      attachment_prefix: attachment_prefix.to_string(),
      page_size: DEFAULT_PAGE_SIZE,
    })
  }

  /// Set the number of items requested per page.
  #[allow(dead_code)]
  pub fn with_page_size(mut self, page_size: u32) -> Self {
    self.page_size = page_size.max(1);
    self
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .api_url
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint {}: {}", path, e))
  }

  fn repo_endpoint(&self, path: &str) -> Result<Url> {
    self.endpoint(&format!("repos/{}/{}/{}", self.owner, self.repo, path))
  }

  async fn get_bytes(&self, url: &Url, accept: &str, authorized: bool) -> Result<Vec<u8>> {
    let mut request = self.http.get(url.clone()).header(ACCEPT, accept);
    if authorized {
      request = request.bearer_auth(&self.token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Failed to request {}: {}", url, e))?;

    let status = response.status();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response from {}: {}", url, e))?;

    if !status.is_success() {
      return Err(eyre!(
        "Request to {} failed with {}: {}",
        url,
        status,
        String::from_utf8_lossy(&body)
      ));
    }

    Ok(body.to_vec())
  }

  async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
    let body = self.get_bytes(url, API_MEDIA_TYPE, true).await?;
    serde_json::from_slice(&body).map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))
  }

  /// Fetch every page of a list endpoint.
  async fn get_all_pages<T: DeserializeOwned>(
    &self,
    base: Url,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<T>> {
    let mut all_items = Vec::new();
    let mut page = 1u32;

    loop {
      let mut url = base.clone();
      {
        let mut query = url.query_pairs_mut();
        if let Some(since) = since {
          query.append_pair("since", &format_timestamp(since));
        }
        query
          .append_pair("per_page", &self.page_size.to_string())
          .append_pair("page", &page.to_string());
      }

      let items: Vec<T> = self.get_json(&url).await?;
      let count = items.len();
      debug!(%url, count, "Fetched page");
      all_items.extend(items);

      // A short page is the last one
      if count < self.page_size as usize {
        break;
      }
      page += 1;
    }

    Ok(all_items)
  }
}

impl TrackerApi for GithubClient {
  async fn list_issues(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ApiIssue>> {
    let mut url = self.repo_endpoint("issues")?;
    url.query_pairs_mut().append_pair("state", "all");

    self
      .get_all_pages(url, since)
      .await
      .map_err(|e| eyre!("Failed to list issues of {}/{}: {}", self.owner, self.repo, e))
  }

  async fn list_comments(
    &self,
    number: u64,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<ApiComment>> {
    let url = self.repo_endpoint(&format!("issues/{}/comments", number))?;

    self
      .get_all_pages(url, since)
      .await
      .map_err(|e| eyre!("Failed to list comments of issue #{}: {}", number, e))
  }

  async fn get_issue(&self, number: u64) -> Result<ApiIssue> {
    let url = self.repo_endpoint(&format!("issues/{}", number))?;

    self
      .get_json(&url)
      .await
      .map_err(|e| eyre!("Failed to get issue #{}: {}", number, e))
  }

  async fn get_user(&self, login: &str) -> Result<ApiUser> {
    let url = self.endpoint(&format!("users/{}", login))?;

    self
      .get_json(&url)
      .await
      .map_err(|e| eyre!("Failed to get user {}: {}", login, e))
  }

  async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>> {
    let parsed = Url::parse(url).map_err(|e| eyre!("Invalid asset URL {}: {}", url, e))?;
    // Never hand the token to hosts outside the tracker
    let authorized = url.starts_with(&self.attachment_prefix)
      || parsed.host_str() == self.api_url.host_str();

    self.get_bytes(&parsed, ANY_MEDIA_TYPE, authorized).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use serde_json::{json, Value};
  use wiremock::matchers::{header, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn tracker() -> TrackerConfig {
    TrackerConfig {
      owner: "acme".to_string(),
      repo: "widgets".to_string(),
      name: None,
    }
  }

  fn client(server: &MockServer) -> GithubClient {
    let github = GithubConfig {
      api_url: server.uri(),
    };
    let prefix = format!("{}/user-attachments/", server.uri());
    GithubClient::new(&github, &tracker(), "secret", &prefix).unwrap()
  }

  fn issue_json(number: u64) -> Value {
    json!({
      "number": number,
      "title": format!("Issue {}", number),
      "body": null,
      "state": "open",
      "created_at": "2024-01-01T00:00:00Z",
      "updated_at": "2024-01-02T00:00:00Z",
      "closed_at": null,
      "user": {"id": 1, "login": "octocat"},
      "assignees": [],
      "comments": 0
    })
  }

  #[tokio::test]
  async fn test_list_issues_follows_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/repos/acme/widgets/issues"))
      .and(query_param("state", "all"))
      .and(query_param("page", "1"))
      .and(header("authorization", "Bearer secret"))
      .and(header("accept", "application/vnd.github+json"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([issue_json(3), issue_json(2)])))
      .expect(1)
      .mount(&server)
      .await;

    Mock::given(method("GET"))
      .and(path("/repos/acme/widgets/issues"))
      .and(query_param("page", "2"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([issue_json(1)])))
      .expect(1)
      .mount(&server)
      .await;

    let issues = client(&server)
      .with_page_size(2)
      .list_issues(None)
      .await
      .unwrap();

    let numbers: Vec<u64> = issues.iter().map(|i| i.number).collect();
    assert_eq!(numbers, vec![3, 2, 1]);
  }

  #[tokio::test]
  async fn test_list_comments_sends_since() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/repos/acme/widgets/issues/4/comments"))
      .and(query_param("since", "2024-03-01T10:00:00Z"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
        "id": 501,
        "body": "Looks good",
        "user": {"id": 2, "login": "hubot"},
        "created_at": "2024-03-01T11:00:00Z",
        "updated_at": "2024-03-01T11:00:00Z"
      }])))
      .expect(1)
      .mount(&server)
      .await;

    let since = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    let comments = client(&server).list_comments(4, Some(since)).await.unwrap();

    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].id, 501);
    assert_eq!(comments[0].user.as_ref().unwrap().login, "hubot");
  }

  #[tokio::test]
  async fn test_error_status_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/repos/acme/widgets/issues/9"))
      .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
      .mount(&server)
      .await;

    let err = client(&server).get_issue(9).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("#9"), "unexpected error: {}", message);
    assert!(message.contains("404"), "unexpected error: {}", message);
  }

  #[tokio::test]
  async fn test_get_user_keeps_profile_fields() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/users/octocat"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": 1,
        "login": "octocat",
        "name": "The Octocat"
      })))
      .mount(&server)
      .await;

    let user = client(&server).get_user("octocat").await.unwrap();
    assert_eq!(user.id, 1);
    assert_eq!(user.extra["name"], "The Octocat");
  }

  #[tokio::test]
  async fn test_fetch_asset_returns_bytes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/user-attachments/files/42/pic.png"))
      .and(header("authorization", "Bearer secret"))
      .and(header("accept", "*/*"))
      .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]))
      .mount(&server)
      .await;

    let url = format!("{}/user-attachments/files/42/pic.png", server.uri());
    let bytes = client(&server).fetch_asset(&url).await.unwrap();
    assert_eq!(bytes, vec![0x89, 0x50, 0x4e, 0x47]);
  }
}
