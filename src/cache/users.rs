//! De-duplicated user table.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::tracker::types::{UserId, UserProfile};

/// Profiles keyed by id. Entries are inserted once and never refreshed.
#[derive(Debug, Clone, Default)]
pub struct UserTable {
  users: BTreeMap<UserId, UserProfile>,
  /// Entries added since the last flush
  pending: usize,
}

impl UserTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_profiles(users: BTreeMap<UserId, UserProfile>) -> Self {
    Self { users, pending: 0 }
  }

  /// Build a table from the stored JSON object, whose keys are stringified ids.
  ///
  /// Keys that are not numbers are skipped; a profile that does not parse is
  /// an error.
  pub fn from_json(raw: BTreeMap<String, Value>) -> Result<Self> {
    let mut users = BTreeMap::new();
    for (key, value) in raw {
      let Ok(id) = key.parse::<UserId>() else {
        warn!(key = %key, "Skipping non-numeric user table key");
        continue;
      };
      let profile: UserProfile =
        serde_json::from_value(value).map_err(|e| eyre!("Invalid profile for user {}: {}", id, e))?;
      users.insert(id, profile);
    }
    Ok(Self::from_profiles(users))
  }

  /// Insert the profile unless its id is known; return the id either way.
  pub fn intern(&mut self, profile: UserProfile) -> UserId {
    let id = profile.id;
    if let std::collections::btree_map::Entry::Vacant(entry) = self.users.entry(id) {
      entry.insert(profile);
      self.pending += 1;
    }
    id
  }

  pub fn contains(&self, id: UserId) -> bool {
    self.users.contains_key(&id)
  }

  pub fn login(&self, id: UserId) -> Option<&str> {
    self.users.get(&id).map(|u| u.login.as_str())
  }

  pub fn len(&self) -> usize {
    self.users.len()
  }

  #[allow(dead_code)]
  pub fn is_empty(&self) -> bool {
    self.users.is_empty()
  }

  /// Whether entries were added since the last flush.
  pub fn is_dirty(&self) -> bool {
    self.pending > 0
  }

  pub fn pending(&self) -> usize {
    self.pending
  }

  pub fn mark_flushed(&mut self) {
    self.pending = 0;
  }

  pub fn profiles(&self) -> &BTreeMap<UserId, UserProfile> {
    &self.users
  }

  pub fn into_profiles(self) -> BTreeMap<UserId, UserProfile> {
    self.users
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn profile(id: UserId, login: &str) -> UserProfile {
    UserProfile {
      id,
      login: login.to_string(),
      extra: Default::default(),
    }
  }

  #[test]
  fn test_intern_twice_adds_one_entry() {
    let mut users = UserTable::new();

    assert_eq!(users.intern(profile(7, "octocat")), 7);
    assert_eq!(users.intern(profile(7, "octocat")), 7);
    assert_eq!(users.len(), 1);
    assert_eq!(users.pending(), 1);
  }

  #[test]
  fn test_intern_never_updates_profile() {
    let mut users = UserTable::new();
    users.intern(profile(7, "old-login"));
    users.intern(profile(7, "new-login"));

    assert_eq!(users.login(7), Some("old-login"));
  }

  #[test]
  fn test_dirty_tracking() {
    let mut users = UserTable::new();
    assert!(!users.is_dirty());

    users.intern(profile(1, "a"));
    assert!(users.is_dirty());

    users.mark_flushed();
    assert!(!users.is_dirty());

    users.intern(profile(1, "a"));
    assert!(!users.is_dirty());
  }

  #[test]
  fn test_from_json_coerces_numeric_keys() {
    let raw: BTreeMap<String, Value> = serde_json::from_value(json!({
      "10": {"id": 10, "login": "ten"},
      "2": {"id": 2, "login": "two", "site_admin": false},
      "notes": {"id": 0, "login": "junk"}
    }))
    .unwrap();

    let users = UserTable::from_json(raw).unwrap();
    let ids: Vec<UserId> = users.profiles().keys().copied().collect();

    assert_eq!(ids, vec![2, 10]);
    assert_eq!(users.login(10), Some("ten"));
    assert!(!users.is_dirty());
  }

  #[test]
  fn test_from_json_rejects_bad_profile() {
    let raw: BTreeMap<String, Value> =
      serde_json::from_value(json!({"3": {"login": "missing-id"}})).unwrap();

    assert!(UserTable::from_json(raw).is_err());
  }
}
