//! Per-key processing status.
//!
//! The cache is a permissive log rather than a state machine: any status may
//! follow any other. The one rule is that [`ProcessingStatus::Done`] deletes
//! the entry instead of storing it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{KeyedJsonBackend, PersistedMap, StoreBackend};
use crate::key::NfeKey;

/// Processing status of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// An attempt is in progress.
    Processing,
    /// An attempt failed and another one is scheduled.
    Retry,
    /// All attempts failed.
    Error,
    /// Resting success marker; kept until superseded or cleared.
    Completed,
    /// Terminal signal; the entry is removed.
    Done,
}

impl ProcessingStatus {
    /// Returns the lowercase string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Retry => "retry",
            Self::Error => "error",
            Self::Completed => "completed",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "retry" => Ok(Self::Retry),
            "error" => Ok(Self::Error),
            "completed" => Ok(Self::Completed),
            "done" => Ok(Self::Done),
            _ => Err(format!(
                "invalid status '{s}': expected one of processing, retry, error, completed, done"
            )),
        }
    }
}

/// Stored status of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Current status (never `done`).
    pub status: ProcessingStatus,
    /// Free-form detail, usually the last error or attempt counter.
    pub message: String,
    /// When the status was last written.
    #[serde(rename = "timestamp", with = "super::timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// Effect of a [`StatusCache::set`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StatusChange {
    /// The entry was created or replaced.
    Upserted(StatusEntry),
    /// `done` removed the entry; `existed` tells whether there was one.
    Removed {
        /// True when an entry was present before removal.
        existed: bool,
    },
}

/// Key to processing-status mapping.
#[derive(Debug)]
pub struct StatusCache {
    map: PersistedMap<StatusEntry>,
}

impl StatusCache {
    /// Opens the cache over `backend`.
    #[must_use]
    pub fn open(backend: Box<dyn StoreBackend<BTreeMap<NfeKey, StatusEntry>>>) -> Self {
        Self {
            map: PersistedMap::open("status_cache", backend),
        }
    }

    /// Opens the cache persisted as JSON at `path`.
    #[must_use]
    pub fn open_json(path: impl Into<PathBuf>) -> Self {
        Self::open(Box::new(KeyedJsonBackend::new(path)))
    }

    /// Records `status` for `key`.
    ///
    /// `done` removes the entry. Any other status replaces it with a timestamp
    /// strictly later than the previous entry's.
    pub fn set(&self, key: &NfeKey, status: ProcessingStatus, message: impl Into<String>) -> StatusChange {
        if status == ProcessingStatus::Done {
            let existed = self.map.evict(key).is_some();
            debug!(key = %key, existed, "status done, entry removed");
            return StatusChange::Removed { existed };
        }

        let message = message.into();
        let entry = self.map.upsert_with(key.clone(), |previous| {
            let now = Utc::now();
            let updated_at = match previous {
                Some(prev) if prev.updated_at >= now => prev.updated_at + TimeDelta::microseconds(1),
                _ => now,
            };
            StatusEntry {
                status,
                message,
                updated_at,
            }
        });
        debug!(key = %key, status = %entry.status, "status updated");
        StatusChange::Upserted(entry)
    }

    /// Returns the status entry for `key`.
    #[must_use]
    pub fn get(&self, key: &NfeKey) -> Option<StatusEntry> {
        self.map.get(key)
    }

    /// Snapshot of every status entry.
    #[must_use]
    pub fn all(&self) -> BTreeMap<NfeKey, StatusEntry> {
        self.map.snapshot()
    }

    /// Removes every entry, returning how many were removed.
    pub fn clear(&self) -> usize {
        self.map.clear()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true when no key has a status.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
