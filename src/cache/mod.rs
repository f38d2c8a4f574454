//! Incremental per-tracker cache.
//!
//! This module provides:
//! - One JSON record per issue, refreshed only when the remote copy is newer
//! - Upsert-by-key merging of nested comment lists
//! - A de-duplicated user table flushed incrementally
//! - A watermark bounding the next fetch window

mod storage;
mod traits;
mod users;
mod watermark;

pub use storage::{read_json, write_atomic, write_json, TrackerStore};
pub use traits::{merge_by_key, needs_refresh};
pub use users::UserTable;
pub use watermark::Watermark;
