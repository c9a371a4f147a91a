//! Key-to-URL resolution.
//!
//! - [`Resolver`] - async seam to the external interception service
//! - [`HttpResolver`] - production implementation over HTTP
//! - [`ResolutionClient`] - cache-first resolution used by interactive requests
//!
//! The resolver service is a black box: given a key and an optional captcha
//! token it either returns a download URL (plus optional metadata) or a
//! failure message.

mod client;
mod error;
mod http;
mod http_client;

pub use client::{Resolution, ResolutionClient};
pub use error::ResolveError;
pub use http::{
    DEFAULT_FAILURE_MESSAGE, DEFAULT_RESOLVER_HOST, DEFAULT_RESOLVER_PORT, HttpResolver,
};
pub use http_client::build_resolver_http_client;

use async_trait::async_trait;

use crate::key::NfeKey;

/// A URL returned by the resolver service.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUrl {
    /// Download URL for the document.
    pub url: String,
    /// Opaque metadata sent along with the URL.
    pub metadata: Option<serde_json::Value>,
}

impl ResolvedUrl {
    /// Creates a resolved URL without metadata.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            metadata: None,
        }
    }
}

/// Turns a key into a download URL with exactly one external call.
///
/// Implementations never retry and never consult caches.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves `key`, forwarding `token` to the service when given.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Rejected`] when the service reports failure and
    /// [`ResolveError::Transport`] or [`ResolveError::Decode`] when no usable
    /// answer was received.
    async fn resolve(&self, key: &NfeKey, token: Option<&str>) -> Result<ResolvedUrl, ResolveError>;
}
