//! Keyed in-memory map with whole-snapshot persistence after each mutation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::StoreBackend;
use crate::key::NfeKey;

type Snapshot<V> = BTreeMap<NfeKey, V>;

/// Map from key to `V`, persisted through a [`StoreBackend`].
///
/// The mutex is held across the in-memory mutation and the following save,
/// so saves land in mutation order. A failed save is logged and never undoes
/// the mutation.
pub struct PersistedMap<V> {
    name: &'static str,
    entries: Mutex<Snapshot<V>>,
    backend: Box<dyn StoreBackend<Snapshot<V>>>,
}

impl<V> fmt::Debug for PersistedMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedMap")
            .field("name", &self.name)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> PersistedMap<V> {
    /// Loads the map from `backend`.
    ///
    /// An unreadable or corrupt snapshot is logged and the map starts empty;
    /// the next mutation overwrites it.
    pub fn open(name: &'static str, backend: Box<dyn StoreBackend<Snapshot<V>>>) -> Self {
        let entries = match backend.load() {
            Ok(Some(entries)) => {
                debug!(store = name, location = %backend.location(), count = entries.len(), "store loaded");
                entries
            }
            Ok(None) => BTreeMap::new(),
            Err(error) => {
                warn!(store = name, location = %backend.location(), %error, "failed to load store, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            name,
            entries: Mutex::new(entries),
            backend,
        }
    }

    /// Returns a clone of the value for `key`.
    #[must_use]
    pub fn get(&self, key: &NfeKey) -> Option<V> {
        self.lock().get(key).cloned()
    }

    /// Returns true when `key` has a value.
    #[must_use]
    pub fn contains(&self, key: &NfeKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Returns a copy of every entry, ordered by key.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<V> {
        self.lock().clone()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Inserts or replaces the value for `key`, returning the previous value.
    pub fn put(&self, key: NfeKey, value: V) -> Option<V> {
        let mut entries = self.lock();
        let previous = entries.insert(key, value);
        self.persist(&entries);
        previous
    }

    /// Computes the new value from the current one and stores it atomically
    /// with respect to other callers of this map.
    pub fn upsert_with(&self, key: NfeKey, build: impl FnOnce(Option<&V>) -> V) -> V {
        let mut entries = self.lock();
        let value = build(entries.get(&key));
        entries.insert(key, value.clone());
        self.persist(&entries);
        value
    }

    /// Inserts `value` only when `key` is absent. Returns true when inserted.
    pub fn insert_if_absent(&self, key: NfeKey, value: V) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, value);
        self.persist(&entries);
        true
    }

    /// Removes `key`, returning its value. Persists only when something changed.
    pub fn evict(&self, key: &NfeKey) -> Option<V> {
        let mut entries = self.lock();
        let removed = entries.remove(key);
        if removed.is_some() {
            self.persist(&entries);
        }
        removed
    }

    /// Removes every entry, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let removed = entries.len();
        entries.clear();
        self.persist(&entries);
        removed
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot<V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &Snapshot<V>) {
        if let Err(error) = self.backend.save(entries) {
            warn!(
                store = self.name,
                location = %self.backend.location(),
                %error,
                "failed to persist store; keeping in-memory state"
            );
        }
    }
}
