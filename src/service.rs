//! Service facade owning the stores and exposing every front-end operation.
//!
//! One [`NfeService`] per process owns the single instance of each store.
//! Front-ends (the CLI here, an HTTP router elsewhere) call these methods and
//! serialize the results; every method returns a structured result.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::batch::{BatchOrchestrator, BatchReport, KeyProgress};
use crate::download::{DownloadEngine, FileKind, HttpClient, RetryPolicy, constants};
use crate::key::{KeyError, NfeKey};
use crate::resolver::{
    DEFAULT_RESOLVER_HOST, DEFAULT_RESOLVER_PORT, HttpResolver, Resolution, ResolutionClient,
    ResolveError, Resolver,
};
use crate::store::{
    AddOutcome, BulkAddOutcome, KeyRegistry, ProcessingStatus, RegistryError, StatusCache,
    StatusChange, StatusEntry, UrlCache, UrlCacheEntry,
};

/// Registry file name under the data directory.
pub const KEYS_FILE: &str = "nfe_keys.txt";
/// URL cache file name under the data directory.
pub const URL_CACHE_FILE: &str = "url_cache.json";
/// Status cache file name under the data directory.
pub const STATUS_CACHE_FILE: &str = "status_cache.json";

/// Errors returned to front-ends.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed key or status.
    #[error("validation error: {message}")]
    Validation {
        /// What was wrong.
        message: String,
    },

    /// The key is unknown.
    #[error("key {key} not found\n  Suggestion: Add it with `add-key` first")]
    NotFound {
        /// The unknown key.
        key: String,
    },

    /// Resolution needs a captcha token.
    #[error("{0}")]
    CredentialRequired(ResolveError),

    /// The resolver reported failure or was unreachable.
    #[error("resolution failed: {message}")]
    Resolution {
        /// The resolver's message or the transport error.
        message: String,
    },

    /// The document could not be downloaded.
    #[error("download failed after {attempts} attempt(s): {message}")]
    Download {
        /// Last error.
        message: String,
        /// Attempts made.
        attempts: u32,
    },
}

impl ServiceError {
    /// Stable kind name for structured output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::CredentialRequired(_) => "credential_required",
            Self::Resolution { .. } => "resolution_failure",
            Self::Download { .. } => "download_failure",
        }
    }

    fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl From<KeyError> for ServiceError {
    fn from(error: KeyError) -> Self {
        Self::validation(error.to_string())
    }
}

impl From<RegistryError> for ServiceError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::InvalidKey(error) => error.into(),
            RegistryError::NotFound { key } => Self::NotFound { key },
        }
    }
}

impl From<ResolveError> for ServiceError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::CredentialRequired { .. } => Self::CredentialRequired(error),
            other => Self::Resolution {
                message: other.to_string(),
            },
        }
    }
}

/// Runtime settings for [`NfeService`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Directory holding the registry and cache files.
    pub data_dir: PathBuf,
    /// Download directory; relative paths are resolved against `data_dir`.
    pub download_dir: PathBuf,
    /// Failure report directory; relative paths are resolved against `data_dir`.
    pub report_dir: PathBuf,
    /// Resolver service host.
    pub resolver_host: String,
    /// Resolver service port.
    pub resolver_port: u16,
    /// Per-request timeout for the resolver service.
    pub resolver_timeout: Duration,
    /// Per-request timeout for document downloads.
    pub download_timeout: Duration,
    /// Retry budget for interactive downloads.
    pub interactive_policy: RetryPolicy,
    /// Retry budget per key in batch runs.
    pub batch_policy: RetryPolicy,
    /// Optional age after which cached URLs are ignored.
    pub url_cache_ttl: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            download_dir: PathBuf::from("downloads"),
            report_dir: PathBuf::from("logs"),
            resolver_host: DEFAULT_RESOLVER_HOST.to_string(),
            resolver_port: DEFAULT_RESOLVER_PORT,
            resolver_timeout: Duration::from_secs(constants::DOWNLOAD_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(constants::DOWNLOAD_TIMEOUT_SECS),
            interactive_policy: RetryPolicy::interactive(),
            batch_policy: RetryPolicy::batch(),
            url_cache_ttl: None,
        }
    }
}

impl ServiceConfig {
    /// Default configuration rooted at `data_dir`.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Resolved download directory.
    #[must_use]
    pub fn download_path(&self) -> PathBuf {
        self.data_dir.join(&self.download_dir)
    }

    /// Resolved report directory.
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.data_dir.join(&self.report_dir)
    }
}

/// A document downloaded for a front-end.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadedDocument {
    /// The key.
    pub key: NfeKey,
    /// File name offered to the client (`NFE_<key>.<ext>`).
    pub file_name: String,
    /// Content type matching the file extension.
    pub content_type: &'static str,
    /// Where the file was stored.
    pub path: PathBuf,
    /// True when the URL came from the cache.
    pub from_cache: bool,
    /// Download attempts made.
    pub attempts: u32,
    /// File content.
    #[serde(skip)]
    pub content: Vec<u8>,
}

/// Everything known about one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyDetails {
    /// The key.
    pub key: NfeKey,
    /// Whether the key is in the registry.
    pub registered: bool,
    /// Cached URL entry.
    pub url_cache: Option<UrlCacheEntry>,
    /// Processing status entry.
    pub status: Option<StatusEntry>,
    /// Previously downloaded file.
    pub downloaded_file: Option<PathBuf>,
}

/// Result of [`NfeService::seed_url_cache`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedOutcome {
    /// Entries inserted.
    pub inserted: usize,
    /// Keys that already had an entry.
    pub existing: usize,
    /// Rejected keys.
    pub invalid_keys: Vec<String>,
}

/// The facade.
#[derive(Debug)]
pub struct NfeService {
    config: ServiceConfig,
    registry: Arc<KeyRegistry>,
    url_cache: Arc<UrlCache>,
    statuses: Arc<StatusCache>,
    resolution: ResolutionClient,
    engine: DownloadEngine,
}

impl NfeService {
    /// Opens the stores under `config.data_dir` and connects to the resolver service.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Resolution`] when the resolver client cannot be built.
    pub fn open(config: ServiceConfig) -> Result<Self, ServiceError> {
        let resolver = HttpResolver::new(
            &config.resolver_host,
            config.resolver_port,
            config.resolver_timeout,
        )?;
        Ok(Self::with_resolver(config, Arc::new(resolver)))
    }

    /// Opens the stores under `config.data_dir` with a caller-supplied resolver.
    #[must_use]
    pub fn with_resolver(config: ServiceConfig, resolver: Arc<dyn Resolver>) -> Self {
        let ttl = config
            .url_cache_ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok());
        let url_cache = Arc::new(UrlCache::open_json(config.data_dir.join(URL_CACHE_FILE), ttl));
        let statuses = Arc::new(StatusCache::open_json(
            config.data_dir.join(STATUS_CACHE_FILE),
        ));
        let registry = Arc::new(KeyRegistry::open_file(
            config.data_dir.join(KEYS_FILE),
            Arc::clone(&url_cache),
        ));
        let resolution = ResolutionClient::new(Arc::clone(&url_cache), resolver);
        let engine = DownloadEngine::new(
            HttpClient::with_timeout(config.download_timeout),
            Arc::clone(&statuses),
            config.interactive_policy,
        );
        debug!(data_dir = %config.data_dir.display(), keys = registry.len(), "service opened");

        Self {
            config,
            registry,
            url_cache,
            statuses,
            resolution,
            engine,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Resolves `key` to a URL, cache first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`], [`ServiceError::CredentialRequired`]
    /// or [`ServiceError::Resolution`].
    #[instrument(skip(self, token), fields(key = %key))]
    pub async fn resolve_url(&self, key: &str, token: Option<&str>) -> Result<Resolution, ServiceError> {
        let key = NfeKey::parse(key)?;
        self.resolve_key(&key, token).await
    }

    /// Resolves and downloads `key`, returning the document content.
    ///
    /// # Errors
    ///
    /// Returns the resolution errors of [`Self::resolve_url`] or
    /// [`ServiceError::Download`] when every attempt failed.
    #[instrument(skip(self, token), fields(key = %key))]
    pub async fn download(&self, key: &str, token: Option<&str>) -> Result<DownloadedDocument, ServiceError> {
        let key = NfeKey::parse(key)?;
        let resolution = self.resolve_key(&key, token).await?;

        let outcome = self
            .engine
            .download(&resolution.url, &key, &self.config.download_path())
            .await;
        let (Some(path), Some(kind), true) = (outcome.path.clone(), outcome.kind, outcome.success)
        else {
            return Err(ServiceError::Download {
                message: outcome.message,
                attempts: outcome.attempts,
            });
        };

        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| ServiceError::Download {
                message: format!("failed to read {}: {e}", path.display()),
                attempts: outcome.attempts,
            })?;

        Ok(DownloadedDocument {
            file_name: format!("{}.{}", key.file_stem(), kind.extension()),
            content_type: kind.mime_type(),
            key,
            path,
            from_cache: resolution.from_cache,
            attempts: outcome.attempts,
            content,
        })
    }

    /// Registered keys in insertion order.
    #[must_use]
    pub fn list_keys(&self) -> Vec<NfeKey> {
        self.registry.list()
    }

    /// Registers one key.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for a malformed key.
    pub fn add_key(&self, key: &str) -> Result<AddOutcome, ServiceError> {
        Ok(self.registry.add(key)?)
    }

    /// Registers many keys at once.
    pub fn add_keys_bulk<I, S>(&self, keys: I) -> BulkAddOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.registry.add_many(keys)
    }

    /// Registers every 44-digit key found in `text`.
    pub fn import_keys(&self, text: &str) -> BulkAddOutcome {
        self.registry.import_text(text)
    }

    /// Removes a key and its cached URL.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] or [`ServiceError::NotFound`].
    pub fn remove_key(&self, key: &str) -> Result<(), ServiceError> {
        let key = NfeKey::parse(key)?;
        Ok(self.registry.remove(&key)?)
    }

    /// Empties the registry and the URL cache. Returns the number of keys removed.
    pub fn clear_keys(&self) -> usize {
        self.registry.clear()
    }

    /// Every status entry.
    #[must_use]
    pub fn get_status_all(&self) -> BTreeMap<NfeKey, StatusEntry> {
        self.statuses.all()
    }

    /// Sets a key's status from its lowercase name.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for a malformed key or unknown status.
    pub fn set_status(&self, key: &str, status: &str, message: &str) -> Result<StatusChange, ServiceError> {
        let key = NfeKey::parse(key)?;
        let status: ProcessingStatus = status.trim().parse().map_err(ServiceError::validation)?;
        Ok(self.statuses.set(&key, status, message))
    }

    /// Every cached URL.
    #[must_use]
    pub fn get_url_cache(&self) -> BTreeMap<NfeKey, UrlCacheEntry> {
        self.url_cache.entries()
    }

    /// Empties the URL cache. Returns the number of entries removed.
    pub fn clear_url_cache(&self) -> usize {
        let removed = self.url_cache.clear_all();
        info!(removed, "url cache cleared");
        removed
    }

    /// Empties the status cache. Returns the number of entries removed.
    pub fn clear_status_cache(&self) -> usize {
        let removed = self.statuses.clear();
        info!(removed, "status cache cleared");
        removed
    }

    /// Seeds externally obtained URLs without overwriting existing entries.
    pub fn seed_url_cache<I, K, U>(&self, pairs: I) -> SeedOutcome
    where
        I: IntoIterator<Item = (K, U)>,
        K: AsRef<str>,
        U: Into<String>,
    {
        let mut outcome = SeedOutcome::default();
        for (key, url) in pairs {
            match NfeKey::parse(key.as_ref()) {
                Ok(key) => {
                    if self.url_cache.seed(key, url.into()) {
                        outcome.inserted += 1;
                    } else {
                        outcome.existing += 1;
                    }
                }
                Err(_) => outcome.invalid_keys.push(key.as_ref().to_string()),
            }
        }
        info!(inserted = outcome.inserted, existing = outcome.existing, "url cache seeded");
        outcome
    }

    /// Everything known about `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for a malformed key and
    /// [`ServiceError::NotFound`] when no store knows the key.
    pub fn get_details(&self, key: &str) -> Result<KeyDetails, ServiceError> {
        let key = NfeKey::parse(key)?;
        let registered = self.registry.contains(&key);
        let url_cache = self.url_cache.get_raw(&key);
        let status = self.statuses.get(&key);
        if !registered && url_cache.is_none() && status.is_none() {
            return Err(ServiceError::NotFound {
                key: key.to_string(),
            });
        }
        let downloaded_file = find_downloaded_file(&self.config.download_path(), &key);
        Ok(KeyDetails {
            key,
            registered,
            url_cache,
            status,
            downloaded_file,
        })
    }

    /// Runs the batch pipeline over every registered key.
    pub async fn run_batch(&self) -> BatchReport {
        self.run_batch_with_progress(|_| {}).await
    }

    /// Runs the batch pipeline, reporting after each key.
    pub async fn run_batch_with_progress(&self, on_key: impl FnMut(KeyProgress<'_>)) -> BatchReport {
        self.batch_orchestrator().run_with_progress(on_key).await
    }

    fn batch_orchestrator(&self) -> BatchOrchestrator {
        BatchOrchestrator::new(
            Arc::clone(&self.registry),
            self.resolution.clone(),
            self.engine.clone(),
            Arc::clone(&self.statuses),
            self.config.download_path(),
            self.config.report_path(),
        )
        .with_policy(self.config.batch_policy)
    }

    async fn resolve_key(&self, key: &NfeKey, token: Option<&str>) -> Result<Resolution, ServiceError> {
        match self.resolution.resolve(key, token).await {
            Ok(resolution) => Ok(resolution),
            Err(error @ ResolveError::CredentialRequired { .. }) => Err(error.into()),
            Err(error) => {
                warn!(key = %key, %error, "resolution failed");
                self.statuses
                    .set(key, ProcessingStatus::Error, error.to_string());
                Err(error.into())
            }
        }
    }
}

fn find_downloaded_file(dir: &Path, key: &NfeKey) -> Option<PathBuf> {
    FileKind::all()
        .iter()
        .map(|kind| dir.join(format!("{}.{}", key.file_stem(), kind.extension())))
        .find(|path| path.is_file())
}
