mod assets;
mod cache;
mod combine;
mod config;
mod parse;
mod sync;
mod tracker;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::assets::AssetMirror;
use crate::cache::TrackerStore;
use crate::config::{Config, TrackerConfig};
use crate::sync::Syncer;
use crate::tracker::client::GithubClient;

#[derive(Parser, Debug)]
#[command(name = "issue-mirror")]
#[command(about = "Mirror GitHub issues, comments and attachments into a local JSON cache")]
#[command(version)]
struct Args {
  /// Path to config file
  /// (default: ./issue-mirror.yaml or $XDG_CONFIG_HOME/issue-mirror/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Only process the tracker with this name
  #[arg(short, long)]
  tracker: Option<String>,

  /// Skip syncing and only rebuild the combined and parsed files
  #[arg(long)]
  offline: bool,
}

// Single-threaded: trackers and issues are processed one after another
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = init_tracing(config.log_file.as_deref())?;

  let trackers: Vec<&TrackerConfig> = config
    .trackers
    .iter()
    .filter(|t| args.tracker.as_deref().map_or(true, |name| t.name() == name))
    .collect();

  if trackers.is_empty() {
    return Err(match args.tracker {
      Some(name) => eyre!("No tracker named {} in configuration", name),
      None => eyre!("No trackers configured"),
    });
  }

  let mut failed = Vec::new();

  if !args.offline {
    let token = Config::get_api_token()?;
    for tracker in &trackers {
      if let Err(e) = sync_tracker(&config, tracker, &token).await {
        error!(tracker = tracker.name(), error = %e, "Sync failed");
        failed.push(tracker.name());
      }
    }
  }

  for tracker in &trackers {
    let store = TrackerStore::for_tracker(&config, tracker);
    let assets = AssetMirror::new(&config.attachments, store.assets_dir());
    let result = combine::combine(&store).and_then(|_| parse::parse(&store, &assets));
    if let Err(e) = result {
      error!(tracker = tracker.name(), error = %e, "Failed to build output data");
      if !failed.contains(&tracker.name()) {
        failed.push(tracker.name());
      }
    }
  }

  if failed.is_empty() {
    Ok(())
  } else {
    Err(eyre!("{} tracker(s) failed: {}", failed.len(), failed.join(", ")))
  }
}

async fn sync_tracker(config: &Config, tracker: &TrackerConfig, token: &str) -> Result<()> {
  info!(tracker = tracker.name(), "Backing up issues for {}/{}", tracker.owner, tracker.repo);

  let store = TrackerStore::for_tracker(config, tracker);
  let client = GithubClient::new(&config.github, tracker, token, &config.attachments.prefix)?;
  let assets = AssetMirror::new(&config.attachments, store.assets_dir());

  let mut users = store.load_users()?;
  let mut watermark = store.load_watermark()?;

  let report = Syncer::new(&client, &store, &assets)
    .with_full_profiles(config.fetch_full_profiles)
    .sync(&mut users, &mut watermark)
    .await?;

  info!(
    tracker = tracker.name(),
    fetched = report.fetched,
    written = report.written,
    skipped = report.skipped,
    comments_added = report.comments_added,
    comments_replaced = report.comments_replaced,
    assets = report.assets_downloaded,
    users = report.users_added,
    watermark_advanced = report.watermark_advanced,
    "Sync pass finished"
  );

  if report.failed.is_empty() && report.errors.is_empty() {
    Ok(())
  } else {
    let problems: Vec<String> = report
      .failed
      .iter()
      .map(|f| format!("#{}: {}", f.number, f.error))
      .chain(report.errors.iter().cloned())
      .collect();
    Err(eyre!(
      "Sync incomplete ({}); watermark left unchanged",
      problems.join(", ")
    ))
  }
}

/// Log to stderr, and additionally to `log_file` when configured.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let (file_layer, guard) = match log_file {
    Some(path) => {
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let appender = tracing_appender::rolling::never(dir, file_name);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(file_layer)
    .init();

  Ok(guard)
}
