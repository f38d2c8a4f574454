//! Attachment extraction and mirroring.
//!
//! Bodies embed images either as markdown (`![alt](url)`) or as HTML
//! (`<img src="url">`). Only URLs below the configured attachment prefix are
//! mirrored; third-party images stay remote.

use regex::{Captures, Regex};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::cache::write_atomic;
use crate::config::AttachmentsConfig;
use crate::tracker::TrackerApi;

static MARKDOWN_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(!\[[^\]]*\]\()([^)\s]+)((?:\s+"[^"]*")?\))"#).expect("valid markdown image regex")
});

static HTML_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(?i)(<img\b[^>]*?\ssrc\s*=\s*["'])([^"']+)(["'])"#).expect("valid img tag regex")
});

/// Finds attachment URLs in bodies and keeps a local copy of each.
pub struct AssetMirror {
  prefix: String,
  extension: String,
  dir: PathBuf,
}

impl AssetMirror {
  pub fn new(attachments: &AttachmentsConfig, dir: impl Into<PathBuf>) -> Self {
    Self {
      prefix: attachments.prefix.clone(),
      extension: attachments.extension.trim_start_matches('.').to_string(),
      dir: dir.into(),
    }
  }

  pub fn is_attachment(&self, url: &str) -> bool {
    url.starts_with(&self.prefix)
  }

  /// Attachment URLs referenced by `body`, each once.
  pub fn extract(&self, body: &str) -> BTreeSet<String> {
    let markdown = MARKDOWN_IMAGE.captures_iter(body).map(|c| c[2].to_string());
    let html = HTML_IMAGE.captures_iter(body).map(|c| c[2].to_string());

    markdown
      .chain(html)
      .filter(|url| self.is_attachment(url))
      .collect()
  }

  /// Path of the local copy relative to the assets folder, `/`-separated.
  ///
  /// This is the URL path below the prefix; a final segment without an
  /// extension gets the configured one. Paths that cannot be used safely
  /// fall back to a hash of the URL.
  ///
  /// `.../42/pic` and `.../42/pic.png` share one local file, and whichever
  /// is mirrored first is kept. GitHub serves extensionless uploads below
  /// `assets/<uuid>` and named files below `files/<id>/<name>`, so the two
  /// shapes do not meet under the default prefix.
  pub fn local_name(&self, url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    let segments: Vec<&str> = trimmed
      .strip_prefix(&self.prefix)
      .unwrap_or_default()
      .split('/')
      .filter(|s| !s.is_empty())
      .collect();

    let unsafe_segment = |s: &&str| *s == "." || *s == ".." || s.contains('\\') || s.contains(':');
    let Some(last) = segments.last() else {
      return self.hashed_name(url);
    };
    if segments.iter().any(unsafe_segment) {
      return self.hashed_name(url);
    }

    let mut name = segments.join("/");
    if !last.contains('.') {
      name.push('.');
      name.push_str(&self.extension);
    }
    name
  }

  fn hashed_name(&self, url: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    format!("{}.{}", &digest[..16], self.extension)
  }

  pub fn local_path(&self, url: &str) -> PathBuf {
    self
      .local_name(url)
      .split('/')
      .fold(self.dir.clone(), |path, segment| path.join(segment))
  }

  /// Download every attachment referenced by `body` that has no local copy.
  ///
  /// Failures are logged together with the body and never returned.
  /// Returns the number of files downloaded.
  pub async fn mirror<A: TrackerApi>(&self, api: &A, body: Option<&str>) -> usize {
    let Some(body) = body else {
      return 0;
    };

    let mut downloaded = 0;
    for url in self.extract(body) {
      let path = self.local_path(&url);
      if path.exists() {
        debug!(url = %url, "Asset already mirrored, skipping download");
        continue;
      }

      let result = api
        .fetch_asset(&url)
        .await
        .and_then(|bytes| write_atomic(&path, &bytes));

      match result {
        Ok(()) => {
          info!(url = %url, path = %path.display(), "Downloaded asset");
          downloaded += 1;
        }
        Err(e) => warn!(url = %url, error = %e, content = body, "Failed to mirror asset"),
      }
    }

    downloaded
  }

  /// Point attachment links in `body` at their local copies under `link_dir`.
  pub fn rewrite_links(&self, body: &str, link_dir: &str) -> String {
    let local = |url: &str| format!("{}/{}", link_dir.trim_end_matches('/'), self.local_name(url));

    let body = MARKDOWN_IMAGE.replace_all(body, |c: &Captures| {
      if self.is_attachment(&c[2]) {
        format!("{}{}{}", &c[1], local(&c[2]), &c[3])
      } else {
        c[0].to_string()
      }
    });

    HTML_IMAGE
      .replace_all(&body, |c: &Captures| {
        if self.is_attachment(&c[2]) {
          format!("{}{}{}", &c[1], local(&c[2]), &c[3])
        } else {
          c[0].to_string()
        }
      })
      .into_owned()
  }
}
