use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Sync boundary of one tracker: everything modified before `synced_until`
/// has been mirrored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
  pub synced_until: Option<DateTime<Utc>>,
}

impl Watermark {
  /// Watermark at `at`, floored to whole seconds.
  pub fn at(at: DateTime<Utc>) -> Self {
    Self {
      synced_until: Some(at.trunc_subsecs(0)),
    }
  }

  /// Lower bound for the next fetch; `None` means full history.
  pub fn since(&self) -> Option<DateTime<Utc>> {
    self.synced_until
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_at_floors_to_seconds() {
    let precise = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 15).unwrap()
      + chrono::Duration::milliseconds(987);
    let watermark = Watermark::at(precise);

    assert_eq!(
      watermark.since(),
      Some(Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 15).unwrap())
    );
    assert_eq!(
      serde_json::to_string(&watermark).unwrap(),
      r#"{"synced_until":"2024-06-01T08:30:15Z"}"#
    );
  }

  #[test]
  fn test_default_means_full_history() {
    assert_eq!(Watermark::default().since(), None);
  }
}
