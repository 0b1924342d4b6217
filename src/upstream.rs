//! Upstream registry addressing.
//!
//! The upstream base is always spoken to over HTTPS. A plain `http://` base is
//! upgraded rather than rejected; any other scheme is an error. Using a
//! registry other than the public npm registry is allowed but logged.

use std::fmt;

/// Host name of the public npm registry.
pub const OFFICIAL_REGISTRY_HOST: &str = "registry.npmjs.org";

/// Default upstream base.
pub const DEFAULT_UPSTREAM: &str = "https://registry.npmjs.org";

/// Errors raised when an upstream base cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// The value is not an `http(s)` URL with a host.
    #[error("invalid upstream URL `{value}`: {reason}")]
    Invalid {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// A validated HTTPS registry base without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamBase {
    base: String,
    host: String,
}

impl UpstreamBase {
    /// Parses and normalizes an upstream base URL.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Invalid`] when the scheme is neither `http`
    /// nor `https`, or when the host is missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use npm_quarantine::upstream::UpstreamBase;
    ///
    /// let base = UpstreamBase::parse("http://registry.npmjs.org/").expect("valid");
    /// assert_eq!(base.as_str(), "https://registry.npmjs.org");
    /// assert!(base.is_official());
    ///
    /// assert!(UpstreamBase::parse("ftp://mirror.test").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
        let invalid = |reason: &str| UpstreamError::Invalid {
            value: raw.to_owned(),
            reason: reason.to_owned(),
        };
        let trimmed = raw.trim();
        let (scheme, rest) = trimmed
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        if !scheme.eq_ignore_ascii_case("https") && !scheme.eq_ignore_ascii_case("http") {
            return Err(invalid("scheme must be http or https"));
        }

        let without_query = rest.split(['?', '#']).next().unwrap_or_default();
        let (authority, path) = without_query
            .split_once('/')
            .unwrap_or((without_query, ""));
        let host = host_of(authority).to_ascii_lowercase();
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let path = path.trim_end_matches('/');
        let authority = authority.to_ascii_lowercase();
        let base = if path.is_empty() {
            format!("https://{authority}")
        } else {
            format!("https://{authority}/{path}")
        };

        let upstream = Self { base, host };
        if !upstream.is_official() {
            log::warn!("non-official-upstream upstream={}", upstream.base);
        }
        Ok(upstream)
    }

    /// Returns the normalized base URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// Returns the host, without port.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns `true` when the base points at the public npm registry.
    #[must_use]
    pub fn is_official(&self) -> bool {
        self.host == OFFICIAL_REGISTRY_HOST
    }

    /// Builds the metadata URL for `package`.
    ///
    /// Scoped names are requested with an encoded slash, as the npm client
    /// does.
    ///
    /// # Examples
    ///
    /// ```
    /// use npm_quarantine::upstream::UpstreamBase;
    ///
    /// let base = UpstreamBase::default();
    /// assert_eq!(
    ///     base.package_url("@types/node"),
    ///     "https://registry.npmjs.org/@types%2fnode"
    /// );
    /// ```
    #[must_use]
    pub fn package_url(&self, package: &str) -> String {
        let encoded = if package.starts_with('@') {
            package.replacen('/', "%2f", 1)
        } else {
            package.to_owned()
        };
        format!("{}/{encoded}", self.base)
    }

    /// Joins a request path onto the base.
    #[must_use]
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }
}

impl Default for UpstreamBase {
    fn default() -> Self {
        Self {
            base: DEFAULT_UPSTREAM.to_owned(),
            host: OFFICIAL_REGISTRY_HOST.to_owned(),
        }
    }
}

impl fmt::Display for UpstreamBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

fn host_of(authority: &str) -> &str {
    let without_user = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if without_user.starts_with('[') {
        return without_user
            .split_once(']')
            .map_or(without_user, |(bracketed, _)| bracketed.trim_start_matches('['));
    }
    without_user
        .split_once(':')
        .map_or(without_user, |(host, _)| host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::official("https://registry.npmjs.org", "https://registry.npmjs.org")]
    #[case::upgraded("http://registry.npmjs.org", "https://registry.npmjs.org")]
    #[case::trailing_slash("https://mirror.test/npm/", "https://mirror.test/npm")]
    #[case::port("https://localhost:4873", "https://localhost:4873")]
    #[case::uppercase_scheme("HTTPS://Mirror.Test", "https://mirror.test")]
    fn bases_are_normalized(#[case] raw: &str, #[case] expected: &str) {
        let base = UpstreamBase::parse(raw).expect("valid upstream");
        assert_eq!(base.as_str(), expected);
    }

    #[rstest]
    #[case::no_scheme("registry.npmjs.org")]
    #[case::other_scheme("file:///tmp/registry")]
    #[case::no_host("https://")]
    fn unusable_bases_are_rejected(#[case] raw: &str) {
        assert!(UpstreamBase::parse(raw).is_err());
    }

    #[test]
    fn port_is_not_part_of_the_host() {
        let base = UpstreamBase::parse("https://localhost:4873").expect("valid upstream");
        assert_eq!(base.host(), "localhost");
        assert!(!base.is_official());
    }

    #[rstest]
    #[case::plain("left-pad", "https://registry.npmjs.org/left-pad")]
    #[case::scoped("@scope/pkg", "https://registry.npmjs.org/@scope%2fpkg")]
    fn package_urls(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(UpstreamBase::default().package_url(name), expected);
    }

    #[test]
    fn join_strips_leading_slash() {
        assert_eq!(
            UpstreamBase::default().join("/left-pad/-/left-pad-1.3.0.tgz"),
            "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz"
        );
    }

    #[test]
    fn non_official_upstreams_are_logged() {
        let mut logger = logtest::Logger::start();
        let _ = UpstreamBase::parse("https://mirror.test").expect("valid upstream");

        let mut warned = false;
        while let Some(record) = logger.pop() {
            if record.level() == log::Level::Warn
                && record
                    .args()
                    .to_string()
                    .contains("non-official-upstream upstream=https://mirror.test")
            {
                warned = true;
            }
        }
        assert!(warned, "expected a non-official-upstream warning");
    }
}
