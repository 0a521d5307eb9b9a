//! Core types for the notification feed.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since Unix epoch, fractional allowed.
///
/// Ordering and equality use the IEEE total order so timestamps can key
/// hash maps and sort deterministically even with odd server values.
#[derive(Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub f64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Timestamp(secs)
    }

    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// Shift back by a window, used for backfill ranges.
    pub fn saturating_back(self, window: Duration) -> Self {
        Timestamp((self.0 - window.as_secs_f64()).max(0.0))
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Timestamp {}

impl Hash for Timestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<f64> for Timestamp {
    fn from(secs: f64) -> Self {
        Timestamp(secs)
    }
}

/// A tagged, timestamped event tied to a run.
///
/// This is also the live channel wire format: `{id, runid, ts, tags}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,

    #[serde(rename = "runid", alias = "run_id")]
    pub run_id: String,

    #[serde(rename = "ts")]
    pub timestamp: Timestamp,

    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Notification {
    pub fn new<I, S>(
        id: impl Into<String>,
        run_id: impl Into<String>,
        timestamp: impl Into<Timestamp>,
        tags: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            run_id: run_id.into(),
            timestamp: timestamp.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Identity used for de-duplication.
    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            id: self.id.clone(),
            run_id: self.run_id.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// `(id, run_id, timestamp)`: two notifications with the same key are the same event.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub id: String,
    pub run_id: String,
    pub timestamp: Timestamp,
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.id, self.run_id, self.timestamp)
    }
}

/// One keyed datum recorded during a run.
#[derive(Clone, Debug, PartialEq)]
pub struct DetailRecord {
    pub key: String,
    pub timestamp: Timestamp,
    /// Pretty-printed when the server sent JSON, verbatim otherwise.
    pub payload: String,
}

/// Everything the detail endpoint returned for a run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunDetails {
    pub run_id: String,
    pub timestamp: Option<Timestamp>,
    pub tags: BTreeSet<String>,
    pub records: Vec<DetailRecord>,
}
