//! Resolver backed by the external interception service over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::http_client::build_resolver_http_client;
use super::{ResolveError, ResolvedUrl, Resolver};
use crate::key::NfeKey;

/// Default resolver host.
pub const DEFAULT_RESOLVER_HOST: &str = "127.0.0.1";

/// Default resolver port.
pub const DEFAULT_RESOLVER_PORT: u16 = 3002;

/// Message used when the resolver fails without saying why.
pub const DEFAULT_FAILURE_MESSAGE: &str = "failed to obtain URL";

/// Wire shape of the resolver response.
#[derive(Debug, Deserialize)]
struct ResolverResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Calls `GET {base}/api/nfe/interceptar-url/{key}`.
#[derive(Debug, Clone)]
pub struct HttpResolver {
    client: Client,
    base_url: String,
}

impl HttpResolver {
    /// Creates a resolver for `http://{host}:{port}`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Client`] when the HTTP client cannot be built.
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, ResolveError> {
        Self::with_base_url(format!("http://{host}:{port}"), timeout)
    }

    /// Creates a resolver rooted at `base_url` (scheme, host and port).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidEndpoint`] for a malformed base URL and
    /// [`ResolveError::Client`] when the HTTP client cannot be built.
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ResolveError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|_| ResolveError::invalid_endpoint(&base_url))?;
        Ok(Self {
            client: build_resolver_http_client(timeout)?,
            base_url,
        })
    }

    /// Returns the endpoint queried for `key`.
    #[must_use]
    pub fn endpoint(&self, key: &NfeKey) -> String {
        format!("{}/api/nfe/interceptar-url/{}", self.base_url, key)
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    #[instrument(skip(self, token), fields(key = %key, has_token = token.is_some()))]
    async fn resolve(&self, key: &NfeKey, token: Option<&str>) -> Result<ResolvedUrl, ResolveError> {
        let endpoint = self.endpoint(key);
        let mut request_url =
            Url::parse(&endpoint).map_err(|_| ResolveError::invalid_endpoint(&endpoint))?;
        if let Some(token) = token {
            request_url.query_pairs_mut().append_pair("captchaToken", token);
        }

        let response = self
            .client
            .get(request_url)
            .send()
            .await
            .map_err(|e| ResolveError::transport(&endpoint, e))?;
        let status = response.status();
        let body: ResolverResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::decode(&endpoint, e))?;
        debug!(http_status = status.as_u16(), success = body.success, "resolver answered");

        if !body.success {
            let message = body
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
            return Err(ResolveError::rejected(message));
        }

        match body.url.filter(|u| !u.trim().is_empty()) {
            Some(url) => Ok(ResolvedUrl {
                url,
                metadata: body.metadata,
            }),
            None => Err(ResolveError::MissingUrl {
                key: key.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const KEY: &str = "51240228517882000186550010000090161000270486";

    #[test]
    fn test_endpoint_uses_host_and_port() {
        let resolver = HttpResolver::new("10.0.0.5", 4000, Duration::from_secs(5)).unwrap();
        let key = NfeKey::parse(KEY).unwrap();
        assert_eq!(
            resolver.endpoint(&key),
            format!("http://10.0.0.5:4000/api/nfe/interceptar-url/{KEY}")
        );
    }

    #[test]
    fn test_with_base_url_strips_trailing_slash() {
        let resolver =
            HttpResolver::with_base_url("http://localhost:3002/", Duration::from_secs(5)).unwrap();
        let key = NfeKey::parse(KEY).unwrap();
        assert!(resolver.endpoint(&key).starts_with("http://localhost:3002/api/"));
    }

    #[test]
    fn test_with_base_url_rejects_garbage() {
        let result = HttpResolver::with_base_url("not a url", Duration::from_secs(5));
        assert!(matches!(result, Err(ResolveError::InvalidEndpoint { .. })));
    }

    #[test]
    fn test_response_defaults_missing_fields() {
        let body: ResolverResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!body.success);
        assert!(body.message.is_none());
        assert!(body.url.is_none());
    }
}
