//! Batch processing over the whole key registry.
//!
//! Keys are processed one at a time. Each key gets a fixed budget of
//! resolve-then-download attempts; keys that exhaust it are collected into a
//! failure report written as `failed_keys_<YYYYmmdd_HHMMSS>.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::download::{DownloadEngine, RetryDecision, RetryPolicy};
use crate::key::NfeKey;
use crate::resolver::ResolutionClient;
use crate::store::{KeyRegistry, ProcessingStatus, StatusCache};

/// Structured detail for a key that exhausted its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedKey {
    /// The failed key.
    pub key: NfeKey,
    /// Resolver calls that produced a decodable answer.
    pub attempts_api: u32,
    /// Download engine invocations.
    pub attempts_download: u32,
    /// Last failure message.
    pub error: String,
    /// When processing of the key began.
    pub timestamp: DateTime<Utc>,
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Keys processed.
    pub total: usize,
    /// Keys downloaded successfully.
    pub successful_count: usize,
    /// Keys that exhausted their attempts.
    pub failed: Vec<FailedKey>,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: DateTime<Utc>,
    /// Failure report file, when one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

impl BatchReport {
    /// Number of failed keys.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Progress notification emitted after each key.
#[derive(Debug, Clone, Copy)]
pub struct KeyProgress<'a> {
    /// 1-based position of the key in the run.
    pub position: usize,
    /// Keys in the run.
    pub total: usize,
    /// The key just processed.
    pub key: &'a NfeKey,
    /// Whether the key succeeded.
    pub success: bool,
}

/// Failure writing the report file.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report could not be written.
    #[error("failed to write failure report {path}: {source}")]
    Io {
        /// Report path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The report could not be serialized.
    #[error("failed to encode failure report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Runs resolution and download over every registered key.
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    registry: Arc<KeyRegistry>,
    resolution: ResolutionClient,
    engine: DownloadEngine,
    statuses: Arc<StatusCache>,
    download_dir: PathBuf,
    report_dir: PathBuf,
    policy: RetryPolicy,
}

impl BatchOrchestrator {
    /// Creates an orchestrator with the batch retry budget.
    #[must_use]
    pub fn new(
        registry: Arc<KeyRegistry>,
        resolution: ResolutionClient,
        engine: DownloadEngine,
        statuses: Arc<StatusCache>,
        download_dir: impl Into<PathBuf>,
        report_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            resolution,
            engine,
            statuses,
            download_dir: download_dir.into(),
            report_dir: report_dir.into(),
            policy: RetryPolicy::batch(),
        }
    }

    /// Replaces the per-key attempt budget.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Processes every registered key.
    pub async fn run(&self) -> BatchReport {
        self.run_with_progress(|_| {}).await
    }

    /// Processes every registered key, calling `on_key` after each one.
    ///
    /// The registry is read once at the start; keys added during the run are
    /// not picked up. A single key's failure never stops the run.
    #[instrument(skip(self, on_key), fields(max_attempts = self.policy.max_attempts()))]
    pub async fn run_with_progress(&self, mut on_key: impl FnMut(KeyProgress<'_>)) -> BatchReport {
        let started_at = Utc::now();
        let keys = self.registry.list();
        let total = keys.len();
        info!(total, "batch run started");

        let mut successful_count = 0;
        let mut failed = Vec::new();
        for (index, key) in keys.iter().enumerate() {
            let success = match self.process_key(key).await {
                Ok(()) => {
                    successful_count += 1;
                    true
                }
                Err(detail) => {
                    failed.push(detail);
                    false
                }
            };
            on_key(KeyProgress {
                position: index + 1,
                total,
                key,
                success,
            });
        }

        let report_path = if failed.is_empty() {
            None
        } else {
            match write_failure_report(&self.report_dir, &failed) {
                Ok(path) => {
                    info!(path = %path.display(), failed = failed.len(), "failure report written");
                    Some(path)
                }
                Err(error) => {
                    warn!(%error, "could not write failure report");
                    None
                }
            }
        };

        info!(total, successful = successful_count, failed = failed.len(), "batch run finished");
        BatchReport {
            total,
            successful_count,
            failed,
            started_at,
            finished_at: Utc::now(),
            report_path,
        }
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn process_key(&self, key: &NfeKey) -> Result<(), FailedKey> {
        let mut detail = FailedKey {
            key: key.clone(),
            attempts_api: 0,
            attempts_download: 0,
            error: String::new(),
            timestamp: Utc::now(),
        };
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.resolution.resolve_uncached(key, None).await {
                Ok(resolution) => {
                    detail.attempts_api += 1;
                    let outcome = self
                        .engine
                        .download(&resolution.url, key, &self.download_dir)
                        .await;
                    detail.attempts_download += 1;
                    if outcome.success {
                        info!(attempt, "key processed");
                        return Ok(());
                    }
                    detail.error = format!("download failed: {}", outcome.message);
                }
                Err(error) if error.is_resolver_answer() => {
                    detail.attempts_api += 1;
                    detail.error = format!("resolver reported failure: {error}");
                }
                Err(error) => {
                    detail.error = format!("request error: {error}");
                }
            }

            warn!(attempt, max_attempts = self.policy.max_attempts(), error = %detail.error, "attempt failed");
            match self.policy.should_retry(attempt) {
                RetryDecision::Retry { delay, .. } => tokio::time::sleep(delay).await,
                RetryDecision::DoNotRetry { .. } => {
                    self.statuses
                        .set(key, ProcessingStatus::Error, detail.error.clone());
                    return Err(detail);
                }
            }
        }
    }
}

/// Writes `failed` as pretty JSON to `failed_keys_<local timestamp>.json` in `dir`.
///
/// # Errors
///
/// Returns [`ReportError`] when the directory or file cannot be written.
pub fn write_failure_report(dir: &Path, failed: &[FailedKey]) -> Result<PathBuf, ReportError> {
    fs::create_dir_all(dir).map_err(|source| ReportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(format!(
        "failed_keys_{}.json",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let json = serde_json::to_string_pretty(failed)?;
    fs::write(&path, json).map_err(|source| ReportError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
