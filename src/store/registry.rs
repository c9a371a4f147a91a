//! Ordered, deduplicated registry of access keys.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{LineFileBackend, StoreBackend, UrlCache};
use crate::key::{KeyError, NfeKey, extract_keys};

/// Maximum number of rejected inputs echoed back by [`KeyRegistry::add_many`].
pub const INVALID_PREVIEW_LIMIT: usize = 10;

/// Errors returned by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The input is not a valid key.
    #[error(transparent)]
    InvalidKey(#[from] KeyError),

    /// The key is not registered.
    #[error("key {key} is not registered\n  Suggestion: Run `list-keys` to see registered keys")]
    NotFound {
        /// The missing key.
        key: String,
    },
}

/// Result of [`KeyRegistry::add`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    /// The validated key.
    pub key: NfeKey,
    /// True when the key was already registered and nothing changed.
    pub already_exists: bool,
}

/// Result of [`KeyRegistry::add_many`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkAddOutcome {
    /// Keys appended by this call.
    pub added_count: usize,
    /// First rejected inputs, at most [`INVALID_PREVIEW_LIMIT`].
    pub invalid_keys: Vec<String>,
    /// Total rejected inputs.
    pub invalid_count: usize,
    /// Inputs already registered, including repeats within the batch.
    pub existing_count: usize,
}

/// Key list persisted one key per line.
///
/// Removing or clearing keys also evicts the matching resolved URLs.
#[derive(Debug)]
pub struct KeyRegistry {
    keys: Mutex<Vec<NfeKey>>,
    backend: Box<dyn StoreBackend<Vec<NfeKey>>>,
    url_cache: Arc<UrlCache>,
}

impl KeyRegistry {
    /// Loads the registry from `backend`.
    #[must_use]
    pub fn open(backend: Box<dyn StoreBackend<Vec<NfeKey>>>, url_cache: Arc<UrlCache>) -> Self {
        let keys = match backend.load() {
            Ok(Some(keys)) => dedup_preserving_order(keys),
            Ok(None) => Vec::new(),
            Err(error) => {
                warn!(location = %backend.location(), %error, "failed to load key registry, starting empty");
                Vec::new()
            }
        };
        debug!(count = keys.len(), "key registry loaded");

        Self {
            keys: Mutex::new(keys),
            backend,
            url_cache,
        }
    }

    /// Loads the registry from a newline-delimited file at `path`.
    #[must_use]
    pub fn open_file(path: impl Into<PathBuf>, url_cache: Arc<UrlCache>) -> Self {
        Self::open(Box::new(LineFileBackend::new(path)), url_cache)
    }

    /// Validates and appends one key.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidKey`] when `input` is not 44 digits.
    pub fn add(&self, input: &str) -> Result<AddOutcome, RegistryError> {
        let key = NfeKey::parse(input)?;
        let mut keys = self.lock();
        if keys.contains(&key) {
            return Ok(AddOutcome {
                key,
                already_exists: true,
            });
        }
        keys.push(key.clone());
        self.persist(&keys);
        info!(key = %key, "key registered");
        Ok(AddOutcome {
            key,
            already_exists: false,
        })
    }

    /// Validates and appends many keys with a single write.
    ///
    /// Invalid inputs are counted and previewed instead of failing the call.
    pub fn add_many<I, S>(&self, inputs: I) -> BulkAddOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcome = BulkAddOutcome::default();
        let mut keys = self.lock();
        let mut known: HashSet<NfeKey> = keys.iter().cloned().collect();

        for input in inputs {
            let input = input.as_ref();
            match NfeKey::parse(input) {
                Ok(key) => {
                    if known.insert(key.clone()) {
                        keys.push(key);
                        outcome.added_count += 1;
                    } else {
                        outcome.existing_count += 1;
                    }
                }
                Err(_) => {
                    outcome.invalid_count += 1;
                    if outcome.invalid_keys.len() < INVALID_PREVIEW_LIMIT {
                        outcome.invalid_keys.push(input.to_string());
                    }
                }
            }
        }

        if outcome.added_count > 0 {
            self.persist(&keys);
        }
        info!(
            added = outcome.added_count,
            existing = outcome.existing_count,
            invalid = outcome.invalid_count,
            "bulk key registration"
        );
        outcome
    }

    /// Extracts every 44-digit run from `text` and registers them.
    pub fn import_text(&self, text: &str) -> BulkAddOutcome {
        let found = extract_keys(text);
        debug!(candidates = found.len(), "keys extracted from text");
        self.add_many(found)
    }

    /// Removes `key` and evicts its cached URL.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when the key is not registered.
    pub fn remove(&self, key: &NfeKey) -> Result<(), RegistryError> {
        let mut keys = self.lock();
        let Some(position) = keys.iter().position(|k| k == key) else {
            return Err(RegistryError::NotFound {
                key: key.to_string(),
            });
        };
        keys.remove(position);
        self.persist(&keys);
        drop(keys);

        self.url_cache.evict(key);
        info!(key = %key, "key removed");
        Ok(())
    }

    /// Empties the registry and the whole URL cache. Returns the number of keys removed.
    pub fn clear(&self) -> usize {
        let mut keys = self.lock();
        let removed = keys.len();
        keys.clear();
        self.persist(&keys);
        drop(keys);

        let evicted = self.url_cache.clear_all();
        info!(removed, evicted, "key registry cleared");
        removed
    }

    /// Registered keys in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<NfeKey> {
        self.lock().clone()
    }

    /// Returns true when `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &NfeKey) -> bool {
        self.lock().contains(key)
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when no key is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<NfeKey>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, keys: &Vec<NfeKey>) {
        if let Err(error) = self.backend.save(keys) {
            warn!(
                location = %self.backend.location(),
                %error,
                "failed to persist key registry; keeping in-memory state"
            );
        }
    }
}

fn dedup_preserving_order(keys: Vec<NfeKey>) -> Vec<NfeKey> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}
