//! Storage backends behind the in-memory stores.
//!
//! A backend loads and saves a whole snapshot at once; there is no incremental
//! write format. Swapping [`KeyedJsonBackend`] for an embedded key-value store
//! only requires another [`StoreBackend`] implementation.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::StoreError;
use crate::key::NfeKey;

/// Load/save contract for a store snapshot of type `S`.
pub trait StoreBackend<S>: Send + Sync + fmt::Debug {
    /// Loads the persisted snapshot, or `Ok(None)` when nothing was persisted yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing data exists but cannot be read
    /// or decoded.
    fn load(&self) -> Result<Option<S>, StoreError>;

    /// Replaces the persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the snapshot cannot be written.
    fn save(&self, snapshot: &S) -> Result<(), StoreError>;

    /// Human-readable location for log messages.
    fn location(&self) -> String;
}

/// Pretty-printed JSON file rewritten whole on every save.
pub struct JsonFileBackend<S> {
    path: PathBuf,
    _snapshot: PhantomData<fn() -> S>,
}

impl<S> JsonFileBackend<S> {
    /// Creates a backend persisting to `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _snapshot: PhantomData,
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<S> fmt::Debug for JsonFileBackend<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFileBackend")
            .field("path", &self.path)
            .finish()
    }
}

impl<S> StoreBackend<S> for JsonFileBackend<S>
where
    S: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<S>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::json(&self.path, e))
    }

    fn save(&self, snapshot: &S) -> Result<(), StoreError> {
        let json =
            serde_json::to_string_pretty(snapshot).map_err(|e| StoreError::json(&self.path, e))?;
        write_replacing(&self.path, json.as_bytes())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Newline-delimited key list, one key per line.
///
/// Loading skips blank lines, drops lines that are not valid keys (with a
/// warning) and keeps only the first occurrence of a repeated key.
#[derive(Debug)]
pub struct LineFileBackend {
    path: PathBuf,
}

impl LineFileBackend {
    /// Creates a backend persisting to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StoreBackend<Vec<NfeKey>> for LineFileBackend {
    fn load(&self) -> Result<Option<Vec<NfeKey>>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;

        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for (line_index, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match NfeKey::parse(line) {
                Ok(key) => {
                    if seen.insert(key.clone()) {
                        keys.push(key);
                    } else {
                        debug!(line = line_index + 1, key = %key, "skipping duplicate key line");
                    }
                }
                Err(error) => warn!(
                    path = %self.path.display(),
                    line = line_index + 1,
                    %error,
                    "skipping invalid key line"
                ),
            }
        }
        Ok(Some(keys))
    }

    fn save(&self, snapshot: &Vec<NfeKey>) -> Result<(), StoreError> {
        let mut body = String::with_capacity(snapshot.len() * 45);
        for key in snapshot {
            body.push_str(key.as_str());
            body.push('\n');
        }
        write_replacing(&self.path, body.as_bytes())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// JSON object keyed by access key, rewritten whole on every save.
///
/// Loading keeps every entry whose key and value decode; other entries are
/// skipped with a warning, so one bad entry never empties the store. A file
/// that is not a JSON object at all is still a load error.
pub struct KeyedJsonBackend<V> {
    file: JsonFileBackend<BTreeMap<String, serde_json::Value>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> KeyedJsonBackend<V> {
    /// Creates a backend persisting to `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFileBackend::new(path),
            _value: PhantomData,
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl<V> fmt::Debug for KeyedJsonBackend<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedJsonBackend")
            .field("path", &self.file.path())
            .finish()
    }
}

impl<V> StoreBackend<BTreeMap<NfeKey, V>> for KeyedJsonBackend<V>
where
    V: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<BTreeMap<NfeKey, V>>, StoreError> {
        let Some(raw_entries) = self.file.load()? else {
            return Ok(None);
        };

        let mut entries = BTreeMap::new();
        for (raw_key, raw_value) in raw_entries {
            let key = match NfeKey::parse(&raw_key) {
                Ok(key) => key,
                Err(error) => {
                    warn!(path = %self.path().display(), key = %raw_key, %error, "skipping entry with invalid key");
                    continue;
                }
            };
            match serde_json::from_value(raw_value) {
                Ok(value) => {
                    entries.insert(key, value);
                }
                Err(error) => {
                    warn!(path = %self.path().display(), key = %raw_key, %error, "skipping undecodable entry");
                }
            }
        }
        Ok(Some(entries))
    }

    fn save(&self, snapshot: &BTreeMap<NfeKey, V>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StoreError::json(self.path(), e))?;
        write_replacing(self.path(), json.as_bytes())
    }

    fn location(&self) -> String {
        self.file.location()
    }
}

/// In-process backend for tests and ephemeral runs.
///
/// Saves can be made to fail on demand to exercise persistence-warning paths.
#[derive(Debug)]
pub struct MemoryBackend<S> {
    snapshot: Mutex<Option<S>>,
    fail_saves: AtomicBool,
    save_count: AtomicUsize,
}

impl<S> Default for MemoryBackend<S> {
    fn default() -> Self {
        Self {
            snapshot: Mutex::new(None),
            fail_saves: AtomicBool::new(false),
            save_count: AtomicUsize::new(0),
        }
    }
}

impl<S: Clone> MemoryBackend<S> {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that loads `snapshot`.
    #[must_use]
    pub fn with_snapshot(snapshot: S) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    /// Makes subsequent saves fail (`true`) or succeed (`false`).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Returns the last successfully saved snapshot.
    #[must_use]
    pub fn saved(&self) -> Option<S> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }
}

impl<S> StoreBackend<S> for MemoryBackend<S>
where
    S: Clone + Send + fmt::Debug,
{
    fn load(&self) -> Result<Option<S>, StoreError> {
        Ok(self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, snapshot: &S) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "memory backend configured to fail saves".to_string(),
            });
        }
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Writes `contents` to a sibling temp file and renames it over `path`.
fn write_replacing(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, contents).map_err(|e| StoreError::io(&tmp_path, e))?;
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::io(path, error));
    }
    Ok(())
}
