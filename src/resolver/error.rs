//! Error types for key resolution.

use thiserror::Error;

/// Errors returned while turning a key into a download URL.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The key is not cached and no captcha token was supplied.
    #[error(
        "key {key} has no cached URL and needs a captcha token\n  Suggestion: Pass --token with a solved captcha, or seed the URL cache"
    )]
    CredentialRequired {
        /// The key being resolved.
        key: String,
    },

    /// The resolver answered with `success: false`.
    #[error("{message}")]
    Rejected {
        /// The resolver's message, verbatim.
        message: String,
    },

    /// The resolver answered `success: true` without a URL.
    #[error("resolver returned success without a URL for key {key}")]
    MissingUrl {
        /// The key being resolved.
        key: String,
    },

    /// The resolver could not be reached.
    #[error(
        "error processing request to {endpoint}: {source}\n  Suggestion: Check that the resolver service is running (API_HOST/API_PORT)"
    )]
    Transport {
        /// The resolver URL that was called.
        endpoint: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The resolver response body was not the expected JSON.
    #[error("error processing response from {endpoint}: {source}")]
    Decode {
        /// The resolver URL that was called.
        endpoint: String,
        /// The underlying decode error.
        #[source]
        source: reqwest::Error,
    },

    /// The resolver address does not form a valid URL.
    #[error("invalid resolver endpoint: {endpoint}\n  Suggestion: Check resolver_host and resolver_port")]
    InvalidEndpoint {
        /// The rejected endpoint.
        endpoint: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build resolver HTTP client: {reason}")]
    Client {
        /// Why construction failed.
        reason: String,
    },
}

impl ResolveError {
    /// Creates a credential-required error.
    pub fn credential_required(key: impl Into<String>) -> Self {
        Self::CredentialRequired { key: key.into() }
    }

    /// Creates a rejection error carrying the resolver's message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Creates an invalid-endpoint error.
    pub fn invalid_endpoint(endpoint: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Creates a decode error.
    pub fn decode(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Decode {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Returns true when the resolver produced a decodable answer.
    ///
    /// Batch runs count these as API attempts.
    #[must_use]
    pub fn is_resolver_answer(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::MissingUrl { .. })
    }
}
