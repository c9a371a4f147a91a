//! Error types for store persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a [`StoreBackend`](super::StoreBackend) while loading or saving.
///
/// Stores never propagate these to their callers; they are logged as
/// persistence warnings and the in-memory state stays authoritative.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("IO error on store file {path}: {source}")]
    Io {
        /// The backing file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file content could not be encoded or decoded.
    #[error("store file {path} is not valid JSON: {source}")]
    Json {
        /// The backing file path.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// Save was rejected by the backend (used by in-memory test backends).
    #[error("store backend unavailable: {reason}")]
    Unavailable {
        /// Why the backend refused the operation.
        reason: String,
    },
}

impl StoreError {
    /// Creates an IO error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a JSON error for the given path.
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_io_display_includes_path() {
        let err = StoreError::io(
            "/tmp/url_cache.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/url_cache.json"), "Expected path in: {msg}");
        assert!(msg.contains("denied"), "Expected cause in: {msg}");
    }

    #[test]
    fn test_store_error_unavailable_display() {
        let err = StoreError::Unavailable {
            reason: "disk full".to_string(),
        };
        assert!(err.to_string().contains("disk full"));
    }
}
