//! HTTP download engine for NF-e documents.
//!
//! # Features
//!
//! - Streaming downloads into a temporary `.part` file, renamed when complete
//! - Output extension chosen from the `Content-Type` header
//! - Empty bodies rejected and removed
//! - Fixed-delay retries with per-attempt status tracking
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use nfe_core::NfeKey;
//! use nfe_core::download::{DownloadEngine, HttpClient, RetryPolicy};
//! use nfe_core::store::StatusCache;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let statuses = Arc::new(StatusCache::open_json("status_cache.json"));
//! let engine = DownloadEngine::new(HttpClient::new(), statuses, RetryPolicy::interactive());
//! let key = NfeKey::parse("51240228517882000186550010000090161000270486")?;
//! let outcome = engine
//!     .download("https://example.com/nfe.xml", &key, Path::new("./downloads"))
//!     .await;
//! println!("{}: {}", outcome.success, outcome.message);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod file_kind;
mod retry;

pub use client::{FetchedFile, HttpClient};
pub use engine::{DownloadEngine, DownloadOutcome};
pub use error::DownloadError;
pub use file_kind::FileKind;
pub use retry::{RetryDecision, RetryPolicy};
