//! Durable stores owned by the pipeline.
//!
//! - [`KeyRegistry`] - ordered, deduplicated list of access keys
//! - [`UrlCache`] - resolved download URLs per key
//! - [`StatusCache`] - in-flight/failed processing status per key
//!
//! Every store keeps its state in memory and rewrites its whole backing file
//! after each mutation through a [`StoreBackend`]. Persistence is best-effort:
//! a failed save is logged and the in-memory state keeps serving reads.

mod backend;
mod error;
mod persisted;
mod registry;
mod status;
mod url_cache;

pub use backend::{JsonFileBackend, KeyedJsonBackend, LineFileBackend, MemoryBackend, StoreBackend};
pub use error::StoreError;
pub use persisted::PersistedMap;
pub use registry::{AddOutcome, BulkAddOutcome, INVALID_PREVIEW_LIMIT, KeyRegistry, RegistryError};
pub use status::{ProcessingStatus, StatusCache, StatusChange, StatusEntry};
pub use url_cache::{UrlCache, UrlCacheEntry};

/// Serde helpers for timestamps written by this tool and by older tooling.
///
/// Older cache files carry naive local ISO-8601 timestamps without an offset
/// (`2024-03-01T10:20:30.123456`); those are read as UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub(crate) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    #[cfg(test)]
    #[allow(clippy::unwrap_used)]
    mod tests {
        use super::*;
        use chrono::{Datelike, Timelike};

        #[test]
        fn test_parse_rfc3339_with_offset() {
            let parsed = parse("2024-03-01T10:20:30-03:00").unwrap();
            assert_eq!(parsed.hour(), 13);
        }

        #[test]
        fn test_parse_naive_iso_as_utc() {
            let parsed = parse("2024-03-01T10:20:30.123456").unwrap();
            assert_eq!(parsed.day(), 1);
            assert_eq!(parsed.hour(), 10);
        }

        #[test]
        fn test_parse_rejects_garbage() {
            assert!(parse("yesterday").is_none());
        }
    }
}
