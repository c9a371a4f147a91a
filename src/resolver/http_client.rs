//! HTTP client construction for the resolver service.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use super::ResolveError;

/// Connect timeout for the resolver service, capped by the overall timeout.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// User-Agent sent to the resolver service.
const RESOLVER_USER_AGENT: &str = concat!("nfe-downloader/", env!("CARGO_PKG_VERSION"));

/// Builds the client used to call the resolver service.
///
/// Some sandboxed environments panic while reading system proxy settings; in
/// that case the builder is retried with proxies taken from the environment only.
///
/// # Errors
///
/// Returns [`ResolveError::Client`] when the client cannot be constructed.
pub fn build_resolver_http_client(timeout: Duration) -> Result<Client, ResolveError> {
    match try_build_client(timeout, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            warn!("resolver client hit system proxy panic; using env-proxy fallback builder");
            try_build_client(timeout, true).map_err(|failure| failure.into_error())
        }
        Err(failure) => Err(failure.into_error()),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

impl BuildClientFailure {
    fn into_error(self) -> ResolveError {
        let reason = match self {
            Self::Panic => "client construction panicked while reading proxy settings".to_string(),
            Self::Build(error) => error.to_string(),
        };
        ResolveError::Client { reason }
    }
}

fn try_build_client(
    timeout: Duration,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(timeout);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(timeout: Duration) -> ClientBuilder {
    let connect_timeout = timeout.min(Duration::from_secs(CONNECT_TIMEOUT_SECS));
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(timeout)
        .user_agent(RESOLVER_USER_AGENT)
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    let http_proxy = ["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]
        .iter()
        .find_map(|name| non_empty_env(name));
    if let Some(proxy) = http_proxy
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
