//! Resolved download URLs per key.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{KeyedJsonBackend, PersistedMap, StoreBackend};
use crate::key::NfeKey;

/// One cached resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlCacheEntry {
    /// Download URL returned by the resolver.
    pub url: String,
    /// When the URL was resolved.
    #[serde(rename = "timestamp", with = "super::timestamp")]
    pub resolved_at: DateTime<Utc>,
    /// Opaque resolver metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl UrlCacheEntry {
    fn is_fresh(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        ttl.is_none_or(|ttl| now - self.resolved_at <= ttl)
    }
}

/// Key to resolved-URL mapping.
///
/// Entries never expire unless a TTL is configured; with a TTL, stale entries
/// read as absent but stay persisted until overwritten.
#[derive(Debug)]
pub struct UrlCache {
    map: PersistedMap<UrlCacheEntry>,
    ttl: Option<Duration>,
}

impl UrlCache {
    /// Opens the cache over `backend`.
    #[must_use]
    pub fn open(
        backend: Box<dyn StoreBackend<BTreeMap<NfeKey, UrlCacheEntry>>>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            map: PersistedMap::open("url_cache", backend),
            ttl,
        }
    }

    /// Opens the cache persisted as JSON at `path`.
    #[must_use]
    pub fn open_json(path: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        Self::open(Box::new(KeyedJsonBackend::new(path)), ttl)
    }

    /// Returns the entry for `key` unless it is missing or stale.
    #[must_use]
    pub fn get(&self, key: &NfeKey) -> Option<UrlCacheEntry> {
        let entry = self.map.get(key)?;
        if entry.is_fresh(self.ttl, Utc::now()) {
            Some(entry)
        } else {
            debug!(key = %key, resolved_at = %entry.resolved_at, "cached url expired");
            None
        }
    }

    /// Returns the persisted entry for `key`, stale or not.
    #[must_use]
    pub fn get_raw(&self, key: &NfeKey) -> Option<UrlCacheEntry> {
        self.map.get(key)
    }

    /// Stores a fresh resolution, replacing any previous entry.
    pub fn put(&self, key: NfeKey, url: String, metadata: Option<serde_json::Value>) -> UrlCacheEntry {
        let entry = UrlCacheEntry {
            url,
            resolved_at: Utc::now(),
            metadata,
        };
        self.map.put(key, entry.clone());
        entry
    }

    /// Stores an externally obtained URL only when `key` has no entry yet.
    ///
    /// Returns true when the entry was inserted.
    pub fn seed(&self, key: NfeKey, url: String) -> bool {
        let entry = UrlCacheEntry {
            url,
            resolved_at: Utc::now(),
            metadata: None,
        };
        self.map.insert_if_absent(key, entry)
    }

    /// Removes the entry for `key`. Returns true when one existed.
    pub fn evict(&self, key: &NfeKey) -> bool {
        self.map.evict(key).is_some()
    }

    /// Removes every entry, returning how many were removed.
    pub fn clear_all(&self) -> usize {
        self.map.clear()
    }

    /// Snapshot of every persisted entry, including stale ones.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<NfeKey, UrlCacheEntry> {
        self.map.snapshot()
    }

    /// Number of persisted entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true when no entries are persisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;
    use crate::store::MemoryBackend;
    use tempfile::TempDir;

    const KEY_A: &str = "51240228517882000186550010000090161000270486";
    const KEY_B: &str = "51240228517882000186550010000090221000270661";

    fn key(raw: &str) -> NfeKey {
        NfeKey::parse(raw).unwrap()
    }

    fn memory_cache(ttl: Option<Duration>) -> UrlCache {
        UrlCache::open(Box::new(MemoryBackend::new()), ttl)
    }

    #[test]
    fn test_put_then_get_returns_entry() {
        let cache = memory_cache(None);
        let meta = serde_json::json!({"emitente": "ACME"});
        cache.put(key(KEY_A), "https://example.com/a.pdf".to_string(), Some(meta.clone()));

        let entry = cache.get(&key(KEY_A)).unwrap();
        assert_eq!(entry.url, "https://example.com/a.pdf");
        assert_eq!(entry.metadata, Some(meta));
    }

    #[test]
    fn test_put_overwrites_existing_entry() {
        let cache = memory_cache(None);
        cache.put(key(KEY_A), "https://old".to_string(), None);
        cache.put(key(KEY_A), "https://new".to_string(), None);
        assert_eq!(cache.get(&key(KEY_A)).unwrap().url, "https://new");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_seed_does_not_overwrite() {
        let cache = memory_cache(None);
        assert!(cache.seed(key(KEY_A), "https://first".to_string()));
        assert!(!cache.seed(key(KEY_A), "https://second".to_string()));
        assert_eq!(cache.get(&key(KEY_A)).unwrap().url, "https://first");
    }

    #[test]
    fn test_clear_all_makes_every_get_absent() {
        let cache = memory_cache(None);
        cache.put(key(KEY_A), "https://a".to_string(), None);
        cache.put(key(KEY_B), "https://b".to_string(), None);

        assert_eq!(cache.clear_all(), 2);
        assert!(cache.get(&key(KEY_A)).is_none());
        assert!(cache.get(&key(KEY_B)).is_none());
    }

    #[test]
    fn test_ttl_hides_stale_entry_but_keeps_it_persisted() {
        let mut initial = BTreeMap::new();
        initial.insert(
            key(KEY_A),
            UrlCacheEntry {
                url: "https://stale".to_string(),
                resolved_at: Utc::now() - Duration::hours(2),
                metadata: None,
            },
        );
        let cache = UrlCache::open(
            Box::new(MemoryBackend::with_snapshot(initial)),
            Some(Duration::hours(1)),
        );

        assert!(cache.get(&key(KEY_A)).is_none());
        assert_eq!(cache.get_raw(&key(KEY_A)).unwrap().url, "https://stale");
        assert!(cache.get_raw(&key(KEY_B)).is_none());
        assert_eq!(cache.entries().len(), 1);
    }

    #[test]
    fn test_json_file_round_trip_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("url_cache.json");

        let first = UrlCache::open_json(&path, None);
        first.put(key(KEY_A), "https://a".to_string(), None);
        drop(first);

        let second = UrlCache::open_json(&path, None);
        assert_eq!(second.get(&key(KEY_A)).unwrap().url, "https://a");

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"timestamp\""), "Expected timestamp field in: {raw}");
        assert!(!raw.contains("metadata"), "Absent metadata must be omitted: {raw}");
    }

    #[test]
    fn test_loads_legacy_file_with_naive_timestamps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("url_cache.json");
        fs::write(
            &path,
            format!(r#"{{"{KEY_A}": {{"url": "https://legacy", "timestamp": "2024-03-01T10:20:30.123456"}}}}"#),
        )
        .unwrap();

        let cache = UrlCache::open_json(&path, None);
        assert_eq!(cache.get(&key(KEY_A)).unwrap().url, "https://legacy");
    }

    #[test]
    fn test_invalid_key_entry_is_skipped_and_valid_entry_survives_put() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("url_cache.json");
        fs::write(
            &path,
            format!(
                r#"{{"{KEY_A}": {{"url": "https://a", "timestamp": "2024-03-01T10:20:30"}}, "123": {{"url": "https://bad", "timestamp": "2024-03-01T10:20:30"}}}}"#
            ),
        )
        .unwrap();

        let cache = UrlCache::open_json(&path, None);
        assert_eq!(cache.len(), 1);
        cache.put(key(KEY_B), "https://b".to_string(), None);
        drop(cache);

        let reopened = UrlCache::open_json(&path, None);
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get(&key(KEY_A)).unwrap().url, "https://a");
        assert_eq!(reopened.get(&key(KEY_B)).unwrap().url, "https://b");
        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("\"123\""), "Invalid key must be dropped on save: {raw}");
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("url_cache.json");
        fs::write(&path, "[[[").unwrap();

        let cache = UrlCache::open_json(&path, None);
        assert!(cache.is_empty());
    }
}
