//! On-disk JSON storage for one tracker.
//!
//! Layout below the tracker folder:
//!
//! ```text
//! <tracker>/cache/<number>.json   one issue record per file
//! <tracker>/cache/users.json      user table keyed by id
//! <tracker>/cache/watermark.json  sync boundary
//! <tracker>/assets/...            mirrored attachments
//! ```
//!
//! Every write goes through [`write_atomic`], so a file is either the old
//! version or the new one, never a partial write.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::{Config, LayoutConfig, TrackerConfig};
use crate::tracker::types::IssueRecord;

use super::users::UserTable;
use super::watermark::Watermark;

/// File-system storage for a single tracker.
pub struct TrackerStore {
  name: String,
  root: PathBuf,
  layout: LayoutConfig,
}

impl TrackerStore {
  pub fn new(name: &str, root: impl Into<PathBuf>, layout: &LayoutConfig) -> Self {
    Self {
      name: name.to_string(),
      root: root.into(),
      layout: layout.clone(),
    }
  }

  pub fn for_tracker(config: &Config, tracker: &TrackerConfig) -> Self {
    Self::new(tracker.name(), config.tracker_dir(tracker), &config.layout)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn cache_dir(&self) -> PathBuf {
    self.root.join(&self.layout.cache_dir)
  }

  pub fn assets_dir(&self) -> PathBuf {
    self.root.join(&self.layout.assets_dir)
  }

  /// Assets folder as referenced from pages written to the tracker folder.
  pub fn assets_link_dir(&self) -> &str {
    &self.layout.assets_dir
  }

  pub fn issue_path(&self, number: u64) -> PathBuf {
    self.cache_dir().join(format!("{}.json", number))
  }

  pub fn users_path(&self) -> PathBuf {
    self.cache_dir().join(&self.layout.users_file)
  }

  pub fn watermark_path(&self) -> PathBuf {
    self.cache_dir().join(&self.layout.watermark_file)
  }

  pub fn raw_path(&self) -> PathBuf {
    self.root.join(&self.layout.raw_file)
  }

  pub fn parsed_path(&self) -> PathBuf {
    self.root.join(&self.layout.parsed_file)
  }

  /// Load a cached issue; `None` when it was never synced.
  pub fn load_issue(&self, number: u64) -> Result<Option<IssueRecord>> {
    let record: Option<IssueRecord> = read_json(&self.issue_path(number))?;

    match record {
      Some(r) if r.number != number => Err(eyre!(
        "Corrupt cache file {}: contains issue #{}",
        self.issue_path(number).display(),
        r.number
      )),
      other => Ok(other),
    }
  }

  pub fn store_issue(&self, record: &IssueRecord) -> Result<()> {
    write_json(&self.issue_path(record.number), record)
  }

  /// Numbers of all cached issues, taken from `<digits>.json` file names.
  pub fn issue_numbers(&self) -> Result<Vec<u64>> {
    let dir = self.cache_dir();
    if !dir.is_dir() {
      return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(&dir)
      .map_err(|e| eyre!("Failed to list cache directory {}: {}", dir.display(), e))?;

    let mut numbers = Vec::new();
    for entry in entries {
      let entry = entry.map_err(|e| eyre!("Failed to read cache directory entry: {}", e))?;
      let file_name = entry.file_name();
      let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
        continue;
      };
      if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        continue;
      }
      if let Ok(number) = stem.parse::<u64>() {
        numbers.push(number);
      }
    }

    Ok(numbers)
  }

  pub fn load_users(&self) -> Result<UserTable> {
    let path = self.users_path();
    match read_json::<BTreeMap<String, Value>>(&path)? {
      Some(raw) => UserTable::from_json(raw)
        .map_err(|e| eyre!("Corrupt cache file {}: {}", path.display(), e)),
      None => Ok(UserTable::new()),
    }
  }

  /// Write the user table if it gained entries since the last flush.
  ///
  /// Returns whether anything was written.
  pub fn flush_users(&self, users: &mut UserTable) -> Result<bool> {
    if !users.is_dirty() {
      return Ok(false);
    }
    write_json(&self.users_path(), users.profiles())?;
    users.mark_flushed();
    Ok(true)
  }

  pub fn load_watermark(&self) -> Result<Watermark> {
    Ok(read_json(&self.watermark_path())?.unwrap_or_default())
  }

  pub fn store_watermark(&self, watermark: &Watermark) -> Result<()> {
    write_json(&self.watermark_path(), watermark)
  }
}

/// Read and deserialize a JSON file; `None` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
  let contents = match std::fs::read(path) {
    Ok(contents) => contents,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(eyre!("Failed to read {}: {}", path.display(), e)),
  };

  serde_json::from_slice(&contents)
    .map(Some)
    .map_err(|e| eyre!("Corrupt cache file {}: {}", path.display(), e))
}

/// Serialize as pretty JSON and write atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
  let mut json = serde_json::to_vec_pretty(value)
    .map_err(|e| eyre!("Failed to serialize {}: {}", path.display(), e))?;
  json.push(b'\n');
  write_atomic(path, &json)
}

/// Write `contents` to a temporary file next to `path`, fsync it, then
/// rename it over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
  let parent = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  std::fs::create_dir_all(parent)
    .map_err(|e| eyre!("Failed to create directory {}: {}", parent.display(), e))?;

  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Invalid file path: {}", path.display()))?;
  let temp_path = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

  let result = (|| -> std::io::Result<()> {
    let mut file = std::fs::File::create(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    std::fs::rename(&temp_path, path)
  })();

  result.map_err(|e| {
    let _ = std::fs::remove_file(&temp_path);
    eyre!("Failed to write {}: {}", path.display(), e)
  })
}
