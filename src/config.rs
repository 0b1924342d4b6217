//! Configuration loader for the quarantine proxy and the audit tool.
//!
//! Settings live in a TOML file. Every key is optional; omitted keys fall
//! back to the defaults below. Numeric inputs that cannot be a window length
//! are corrected rather than rejected, with a warning, so a typo in a
//! deployment never disables the proxy outright.
//!
//! ```toml
//! enabled = true
//! minutes = 30240
//! policy-on-no-safe = "set-safe"
//! upstream = "https://registry.npmjs.org"
//!
//! [audit]
//! concurrency = 8
//! timeout-secs = 30
//! prefix = false
//! ```

use crate::upstream::{UpstreamBase, UpstreamError};
use camino::{Utf8Path, Utf8PathBuf};
use npm_quarantine_common::policy::QuarantinePolicy;
use npm_quarantine_common::rewrite::{InvalidNoSafePolicy, NoSafePolicy};
use npm_quarantine_common::threshold::QuarantineThreshold;
use serde::Deserialize;
use std::io;
use std::time::Duration;

/// Default number of concurrent registry fetches during an audit.
pub const DEFAULT_AUDIT_CONCURRENCY: usize = 8;

/// Default timeout for one registry request, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration from {path}: {source}")]
    Read {
        /// Path that was read.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML or contains unknown keys.
    #[error("invalid configuration: {source}")]
    Parse {
        /// Parser failure.
        #[from]
        source: toml::de::Error,
    },

    /// `policy-on-no-safe` is not a known policy.
    #[error(transparent)]
    Policy(#[from] InvalidNoSafePolicy),

    /// `upstream` is not a usable registry base.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Result type for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
struct ConfigFile {
    enabled: Option<bool>,
    minutes: Option<f64>,
    policy_on_no_safe: Option<String>,
    upstream: Option<String>,
    audit: AuditFile,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
struct AuditFile {
    concurrency: Option<usize>,
    timeout_secs: Option<u64>,
    prefix: Option<bool>,
}

/// Validated quarantine settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuarantineConfig {
    /// Whether the quarantine applies at all.
    pub enabled: bool,
    /// The quarantine window.
    pub threshold: QuarantineThreshold,
    /// Behaviour when `latest` has no safe replacement.
    pub no_safe: NoSafePolicy,
    /// Registry that metadata is fetched from.
    pub upstream: UpstreamBase,
    /// Audit tool settings.
    pub audit: AuditSettings,
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: QuarantineThreshold::default(),
            no_safe: NoSafePolicy::default(),
            upstream: UpstreamBase::default(),
            audit: AuditSettings::default(),
        }
    }
}

/// Settings specific to the dependency audit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditSettings {
    /// Maximum number of registry fetches in flight. Never below one.
    pub concurrency: usize,
    /// Timeout applied to each registry request.
    pub timeout: Duration,
    /// Re-apply `^`/`~` when pinning a range to its safe version.
    pub prefix: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_AUDIT_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            prefix: false,
        }
    }
}

impl QuarantineConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed TOML, unknown keys, an unknown
    /// policy name or an unusable upstream URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use npm_quarantine::QuarantineConfig;
    ///
    /// let config = QuarantineConfig::from_toml_str("minutes = 90.5\n").expect("valid");
    /// assert_eq!(config.threshold.minutes(), 90);
    /// assert!(config.enabled);
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(source)?;
        Self::from_file(file)
    }

    /// Loads configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// the same errors as [`Self::from_toml_str`].
    pub fn load_from(path: &Utf8Path) -> Result<Self> {
        Self::load_with(path, |target| std::fs::read_to_string(target))
    }

    /// Loads configuration through the supplied reader.
    ///
    /// This exists so tests can simulate file contents and read failures
    /// without touching the file system.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load_from`].
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use npm_quarantine::QuarantineConfig;
    ///
    /// let config = QuarantineConfig::load_with(Utf8Path::new("quarantine.toml"), |_| {
    ///     Ok(String::from("policy-on-no-safe = \"fail\"\n"))
    /// })
    /// .expect("valid");
    /// assert_eq!(config.no_safe.as_str(), "fail");
    /// ```
    pub fn load_with<F>(path: &Utf8Path, reader: F) -> Result<Self>
    where
        F: FnOnce(&Utf8Path) -> io::Result<String>,
    {
        let source = reader(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Returns the policy to apply, or `None` when quarantine is disabled.
    #[must_use]
    pub fn active_policy(&self) -> Option<QuarantinePolicy> {
        self.enabled
            .then(|| QuarantinePolicy::new(self.threshold, self.no_safe))
    }

    fn from_file(file: ConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let threshold = file
            .minutes
            .map_or(defaults.threshold, coerce_minutes);
        let no_safe = match file.policy_on_no_safe {
            Some(raw) => raw.parse()?,
            None => defaults.no_safe,
        };
        let upstream = match file.upstream {
            Some(raw) => UpstreamBase::parse(&raw)?,
            None => defaults.upstream,
        };
        Ok(Self {
            enabled: file.enabled.unwrap_or(defaults.enabled),
            threshold,
            no_safe,
            upstream,
            audit: AuditSettings::from_file(&file.audit),
        })
    }
}

impl AuditSettings {
    fn from_file(file: &AuditFile) -> Self {
        let defaults = Self::default();
        Self {
            concurrency: file
                .concurrency
                .map_or(defaults.concurrency, coerce_concurrency),
            timeout: file
                .timeout_secs
                .map_or(defaults.timeout, Duration::from_secs),
            prefix: file.prefix.unwrap_or(defaults.prefix),
        }
    }
}

/// Turns an untrusted minute count into a threshold, warning when the value
/// had to be corrected.
///
/// # Examples
///
/// ```
/// use npm_quarantine::config::coerce_minutes;
///
/// assert_eq!(coerce_minutes(-10.0).minutes(), 0);
/// assert_eq!(coerce_minutes(45.9).minutes(), 45);
/// ```
#[must_use]
pub fn coerce_minutes(raw: f64) -> QuarantineThreshold {
    let threshold = QuarantineThreshold::from_raw_minutes(raw);
    if !raw.is_finite() || raw < 0.0 || raw.fract() > 0.0 {
        log::warn!(
            "quarantine minutes ({raw}) is invalid and has been corrected to {}",
            threshold.minutes()
        );
    }
    threshold
}

/// Clamps a requested worker count to at least one.
#[must_use]
pub fn coerce_concurrency(requested: usize) -> usize {
    if requested == 0 {
        log::warn!("audit concurrency 0 is invalid and has been corrected to 1");
        return 1;
    }
    requested
}
