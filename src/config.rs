use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub github: GithubConfig,
  /// Root folder holding one sub-folder per tracker
  #[serde(default = "default_output_dir")]
  pub output_dir: PathBuf,
  #[serde(default)]
  pub trackers: Vec<TrackerConfig>,
  #[serde(default)]
  pub attachments: AttachmentsConfig,
  /// Fetch the full profile of a user the first time it is seen instead of
  /// storing the reference embedded in the issue payload
  #[serde(default)]
  pub fetch_full_profiles: bool,
  /// Additional log file (stderr logging is always on)
  pub log_file: Option<PathBuf>,
  #[serde(default)]
  pub layout: LayoutConfig,
}

fn default_output_dir() -> PathBuf {
  PathBuf::from("issues")
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
  #[serde(default = "default_api_url")]
  pub api_url: String,
}

fn default_api_url() -> String {
  "https://api.github.com".to_string()
}

impl Default for GithubConfig {
  fn default() -> Self {
    Self {
      api_url: default_api_url(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
  pub owner: String,
  pub repo: String,
  /// Folder name under `output_dir` (defaults to the repo name)
  pub name: Option<String>,
}

impl TrackerConfig {
  pub fn name(&self) -> &str {
    self.name.as_deref().unwrap_or(&self.repo)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentsConfig {
  /// Only images below this URL prefix are mirrored
  #[serde(default = "default_attachment_prefix")]
  pub prefix: String,
  /// Extension appended to downloaded files whose name has none
  #[serde(default = "default_attachment_extension")]
  pub extension: String,
}

fn default_attachment_prefix() -> String {
  "https://github.com/user-attachments/".to_string()
}

fn default_attachment_extension() -> String {
  "png".to_string()
}

impl Default for AttachmentsConfig {
  fn default() -> Self {
    Self {
      prefix: default_attachment_prefix(),
      extension: default_attachment_extension(),
    }
  }
}

/// Path segments of the per-tracker on-disk layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
  pub cache_dir: String,
  pub assets_dir: String,
  pub users_file: String,
  pub watermark_file: String,
  pub raw_file: String,
  pub parsed_file: String,
}

impl Default for LayoutConfig {
  fn default() -> Self {
    Self {
      cache_dir: "cache".to_string(),
      assets_dir: "assets".to_string(),
      users_file: "users.json".to_string(),
      watermark_file: "watermark.json".to_string(),
      raw_file: "issues_raw.json".to_string(),
      parsed_file: "issues_parsed.json".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./issue-mirror.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/issue-mirror/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ./issue-mirror.yaml or \
                 ~/.config/issue-mirror/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("issue-mirror.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("issue-mirror").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;

    if config.attachments.prefix.is_empty() {
      return Err(eyre!("attachments.prefix must not be empty"));
    }

    let mut names = HashSet::new();
    for tracker in &config.trackers {
      let name = tracker.name();
      if name.is_empty() || name == "." || name.contains(['/', '\\']) || name.contains("..") {
        return Err(eyre!(
          "Tracker name {:?} for {}/{} is not a valid folder name",
          name,
          tracker.owner,
          tracker.repo
        ));
      }
      if !names.insert(name) {
        return Err(eyre!(
          "Tracker name {:?} is used more than once; set a distinct `name` per tracker",
          name
        ));
      }
    }

    Ok(config)
  }

  /// Root folder of one tracker's files.
  pub fn tracker_dir(&self, tracker: &TrackerConfig) -> PathBuf {
    self.output_dir.join(tracker.name())
  }

  /// Get the API token from environment variables.
  ///
  /// Checks ISSUE_MIRROR_TOKEN first, then GITHUB_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("ISSUE_MIRROR_TOKEN")
      .or_else(|_| std::env::var("GITHUB_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set ISSUE_MIRROR_TOKEN or GITHUB_TOKEN environment variable.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml("trackers:\n  - owner: acme\n    repo: widgets\n").unwrap();

    assert_eq!(config.github.api_url, "https://api.github.com");
    assert_eq!(config.output_dir, PathBuf::from("issues"));
    assert_eq!(config.attachments.prefix, "https://github.com/user-attachments/");
    assert_eq!(config.attachments.extension, "png");
    assert_eq!(config.layout.users_file, "users.json");
    assert!(!config.fetch_full_profiles);
    assert_eq!(config.trackers.len(), 1);
    assert_eq!(config.trackers[0].name(), "widgets");
  }

  #[test]
  fn test_tracker_name_override() {
    let yaml = r#"
output_dir: /tmp/mirror
trackers:
  - owner: acme
    repo: widgets
    name: acme-widgets
layout:
  cache_dir: raw
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let tracker = &config.trackers[0];

    assert_eq!(tracker.name(), "acme-widgets");
    assert_eq!(
      config.tracker_dir(tracker),
      PathBuf::from("/tmp/mirror/acme-widgets")
    );
    assert_eq!(config.layout.cache_dir, "raw");
    // Unset layout fields keep their defaults
    assert_eq!(config.layout.assets_dir, "assets");
  }

  #[test]
  fn test_duplicate_tracker_names_rejected() {
    let yaml = r#"
trackers:
  - owner: acme
    repo: widgets
  - owner: other
    repo: widgets
"#;
    let message = Config::from_yaml(yaml).unwrap_err().to_string();
    assert!(message.contains("widgets"), "{}", message);

    let renamed = format!("{}    name: other-widgets\n", yaml.trim_start());
    let config = Config::from_yaml(&renamed).unwrap();
    assert_ne!(
      config.tracker_dir(&config.trackers[0]),
      config.tracker_dir(&config.trackers[1])
    );
  }

  #[test]
  fn test_unsafe_tracker_names_rejected() {
    for name in ["a/b", "..", "up\\dir", "x..y", ""] {
      let yaml = format!(
        "trackers:\n  - owner: acme\n    repo: widgets\n    name: {:?}\n",
        name
      );
      assert!(Config::from_yaml(&yaml).is_err(), "{}", name);
    }
  }

  #[test]
  fn test_empty_attachment_prefix_rejected() {
    let yaml = "attachments:\n  prefix: \"\"\n";
    assert!(Config::from_yaml(yaml).is_err());
  }
}
