//! NF-e Downloader Core Library
//!
//! Resolves 44-digit NF-e access keys into document URLs through an external
//! resolver service, downloads the documents with retries, and tracks each
//! key's processing state across restarts.
//!
//! # Architecture
//!
//! - [`key`] - Access key validation and extraction
//! - [`store`] - Key registry, resolved-URL cache and processing-status cache
//! - [`resolver`] - Resolver service client and cache-first resolution
//! - [`download`] - Retrying download engine with content-type file typing
//! - [`batch`] - Sequential batch runs with failure reports
//! - [`service`] - Facade exposing every front-end operation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod download;
pub mod key;
pub mod resolver;
pub mod service;
pub mod store;
#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use batch::{BatchOrchestrator, BatchReport, FailedKey, KeyProgress};
pub use download::{
    DownloadEngine, DownloadError, DownloadOutcome, FileKind, HttpClient, RetryDecision,
    RetryPolicy,
};
pub use key::{KEY_LENGTH, KeyError, NfeKey, extract_keys, is_valid_key};
pub use resolver::{HttpResolver, Resolution, ResolutionClient, ResolveError, ResolvedUrl, Resolver};
pub use service::{
    DownloadedDocument, KeyDetails, NfeService, SeedOutcome, ServiceConfig, ServiceError,
};
pub use store::{
    AddOutcome, BulkAddOutcome, KeyRegistry, ProcessingStatus, RegistryError, StatusCache,
    StatusChange, StatusEntry, UrlCache, UrlCacheEntry,
};
