//! Cache-first resolution.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use super::{ResolveError, ResolvedUrl, Resolver};
use crate::key::NfeKey;
use crate::store::UrlCache;

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    /// Download URL.
    pub url: String,
    /// Metadata stored with the URL, if any.
    pub metadata: Option<serde_json::Value>,
    /// True when the URL came from the cache without an external call.
    pub from_cache: bool,
}

/// Resolves keys through the URL cache, falling back to the resolver service.
#[derive(Clone)]
pub struct ResolutionClient {
    cache: Arc<UrlCache>,
    resolver: Arc<dyn Resolver>,
}

impl fmt::Debug for ResolutionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionClient")
            .field("cached_urls", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl ResolutionClient {
    /// Creates a client over a shared cache and resolver.
    #[must_use]
    pub fn new(cache: Arc<UrlCache>, resolver: Arc<dyn Resolver>) -> Self {
        Self { cache, resolver }
    }

    /// Returns the cached URL for `key`, or asks the resolver with `token`.
    ///
    /// A cache hit makes no external call. A miss without a token fails before
    /// any call is made. A successful external resolution is cached.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::CredentialRequired`] on a miss without token,
    /// or the resolver's error.
    #[instrument(skip(self, token), fields(key = %key))]
    pub async fn resolve(&self, key: &NfeKey, token: Option<&str>) -> Result<Resolution, ResolveError> {
        if let Some(entry) = self.cache.get(key) {
            debug!("url served from cache");
            return Ok(Resolution {
                url: entry.url,
                metadata: entry.metadata,
                from_cache: true,
            });
        }

        let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
            return Err(ResolveError::credential_required(key.as_str()));
        };

        let resolved = self.resolver.resolve(key, Some(token)).await?;
        Ok(self.remember(key, resolved))
    }

    /// Asks the resolver directly, skipping the cache lookup.
    ///
    /// A successful answer still populates the cache.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error.
    #[instrument(skip(self, token), fields(key = %key))]
    pub async fn resolve_uncached(
        &self,
        key: &NfeKey,
        token: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let resolved = self.resolver.resolve(key, token).await?;
        Ok(self.remember(key, resolved))
    }

    /// The shared URL cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<UrlCache> {
        &self.cache
    }

    fn remember(&self, key: &NfeKey, resolved: ResolvedUrl) -> Resolution {
        let ResolvedUrl { url, metadata } = resolved;
        self.cache.put(key.clone(), url.clone(), metadata.clone());
        info!(key = %key, "url resolved and cached");
        Resolution {
            url,
            metadata,
            from_cache: false,
        }
    }
}
