//! Download engine: bounded retries with per-attempt status tracking.
//!
//! Each attempt streams the URL to `NFE_<key>.<ext>` through [`HttpClient`].
//! Every transition is written to the [`StatusCache`]:
//!
//! | When | Status |
//! |------|--------|
//! | before each attempt | `processing` |
//! | failed attempt, budget left | `retry` |
//! | budget spent | `error` |
//! | success | `done` (entry removed) |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::file_kind::FileKind;
use super::retry::{RetryDecision, RetryPolicy};
use super::{DownloadError, HttpClient};
use crate::key::NfeKey;
use crate::store::{ProcessingStatus, StatusCache};

/// Result of [`DownloadEngine::download`].
///
/// Failures are data, not errors: the caller always gets a message and the
/// number of attempts made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadOutcome {
    /// True when a non-empty file was written.
    pub success: bool,
    /// Success summary or the last error.
    pub message: String,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Written file, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Size of the written file, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Detected document kind, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FileKind>,
}

/// Downloads documents with retries and status bookkeeping.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    client: HttpClient,
    statuses: Arc<StatusCache>,
    policy: RetryPolicy,
}

impl DownloadEngine {
    /// Creates an engine using `policy` by default.
    #[must_use]
    pub fn new(client: HttpClient, statuses: Arc<StatusCache>, policy: RetryPolicy) -> Self {
        debug!(
            max_attempts = policy.max_attempts(),
            delay_ms = policy.delay().as_millis(),
            "creating download engine"
        );
        Self {
            client,
            statuses,
            policy,
        }
    }

    /// Returns the default retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Downloads `url` for `key` into `storage_dir` with the default policy.
    pub async fn download(&self, url: &str, key: &NfeKey, storage_dir: &Path) -> DownloadOutcome {
        self.download_with_policy(url, key, storage_dir, &self.policy)
            .await
    }

    /// Downloads `url` for `key` into `storage_dir` with an explicit policy.
    #[instrument(skip(self, storage_dir, policy), fields(key = %key, max_attempts = policy.max_attempts()))]
    pub async fn download_with_policy(
        &self,
        url: &str,
        key: &NfeKey,
        storage_dir: &Path,
        policy: &RetryPolicy,
    ) -> DownloadOutcome {
        let stem = key.file_stem();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.statuses.set(
                key,
                ProcessingStatus::Processing,
                format!("attempt {attempt}/{}", policy.max_attempts()),
            );
            debug!(attempt, "attempting download");

            let error = match self.client.fetch_to_file(url, storage_dir, &stem).await {
                Ok(fetched) => {
                    self.statuses.set(key, ProcessingStatus::Done, "");
                    info!(attempt, path = %fetched.path.display(), bytes = fetched.bytes, "document saved");
                    return DownloadOutcome {
                        success: true,
                        message: format!(
                            "saved {} ({} bytes)",
                            fetched.path.display(),
                            fetched.bytes
                        ),
                        attempts: attempt,
                        path: Some(fetched.path),
                        bytes: Some(fetched.bytes),
                        kind: Some(fetched.kind),
                    };
                }
                Err(error) => error,
            };

            match policy.should_retry(attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        attempt = next_attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying download"
                    );
                    self.statuses
                        .set(key, ProcessingStatus::Retry, error.to_string());
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    return self.exhausted(key, &error, attempt, &reason);
                }
            }
        }
    }

    fn exhausted(
        &self,
        key: &NfeKey,
        error: &DownloadError,
        attempts: u32,
        reason: &str,
    ) -> DownloadOutcome {
        let message = error.to_string();
        warn!(key = %key, attempts, %reason, error = %message, "download failed");
        self.statuses.set(key, ProcessingStatus::Error, message.clone());
        DownloadOutcome {
            success: false,
            message,
            attempts,
            path: None,
            bytes: None,
            kind: None,
        }
    }
}
