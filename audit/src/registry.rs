//! Registry metadata retrieval for the audit.
//!
//! Fetching sits behind [`MetadataFetcher`] so the resolver can be driven by
//! canned documents in tests and by [`HttpRegistry`] in production.

use npm_quarantine::UpstreamBase;
use serde_json::Value;
use std::time::Duration;

/// Largest metadata document accepted from the registry.
///
/// Full packuments of long-lived packages run to tens of megabytes, well past
/// the HTTP client's default body limit.
pub const MAX_METADATA_BYTES: u64 = 256 * 1024 * 1024;

/// Source of package metadata documents.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataFetcher: Send + Sync {
    /// Fetches the full metadata document for `package`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the document cannot be retrieved or is not
    /// JSON.
    fn fetch(&self, package: &str) -> Result<Value, FetchError>;
}

/// Errors arising while fetching package metadata.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The registry has no such package (HTTP 404).
    #[error("package not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The request failed or returned a non-success status.
    #[error("request failed for {url}: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The response body could not be read.
    #[error("failed to read response from {url}: {reason}")]
    Body {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The response body is not JSON.
    #[error("invalid JSON from {url}: {source}")]
    Json {
        /// The URL that was requested.
        url: String,
        /// Parser failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Fetches metadata over HTTPS using `ureq`.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    agent: ureq::Agent,
    upstream: UpstreamBase,
}

impl HttpRegistry {
    /// Builds a client for `upstream` whose requests give up after `timeout`.
    ///
    /// # Examples
    ///
    /// ```
    /// use npm_quarantine::UpstreamBase;
    /// use npm_quarantine_audit::registry::HttpRegistry;
    /// use std::time::Duration;
    ///
    /// let registry = HttpRegistry::new(UpstreamBase::default(), Duration::from_secs(5));
    /// assert!(registry.upstream().is_official());
    /// ```
    #[must_use]
    pub fn new(upstream: UpstreamBase, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            upstream,
        }
    }

    /// The registry base requests are sent to.
    #[must_use]
    pub const fn upstream(&self) -> &UpstreamBase {
        &self.upstream
    }
}

impl MetadataFetcher for HttpRegistry {
    fn fetch(&self, package: &str) -> Result<Value, FetchError> {
        let url = self.upstream.package_url(package);
        log::debug!("fetch url={url}");
        let mut response = self
            .agent
            .get(&url)
            .header("Accept", "application/json")
            .call()
            .map_err(|e| map_ureq_error(&url, &e))?;
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_METADATA_BYTES)
            .read_to_string()
            .map_err(|e| FetchError::Body {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        serde_json::from_str(&body).map_err(|source| FetchError::Json { url, source })
    }
}

/// Map a ureq error to a [`FetchError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(404) => FetchError::NotFound {
            url: url.to_owned(),
        },
        other => FetchError::Http {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
