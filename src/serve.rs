//! Serving-side decisions for the quarantine proxy.
//!
//! These functions sit between an HTTP front end and the policy engine. They
//! take what the upstream registry returned and decide what the client should
//! see, without doing any I/O themselves:
//!
//! - [`handle_metadata`] rewrites a package document or blocks it;
//! - [`handle_version`] proxies a version manifest or denies it;
//! - [`classify_content_type`] separates metadata from tarballs and other
//!   assets, which are redirected upstream;
//! - [`split_threshold_override`] reads a per-request window from the path.

use crate::config::QuarantineConfig;
use chrono::{DateTime, Utc};
use npm_quarantine_common::metadata::PackageMetadata;
use npm_quarantine_common::policy::{PolicyOutcome, QuarantinePolicy};
use npm_quarantine_common::threshold::{MINUTES_PER_DAY, QuarantineThreshold};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status returned when the `fail` policy blocks a document.
pub const BLOCKED_STATUS: u16 = 409;

/// Body returned with [`BLOCKED_STATUS`].
pub const BLOCKED_BODY: &str = "Quarantine policy blocked: no safe versions";

/// Status returned when a quarantined version is requested directly.
pub const DENIED_STATUS: u16 = 404;

/// Error label carried by every denial payload.
pub const DENIAL_ERROR: &str = "Version Not Found due to Quarantine Policy";

/// Cache policy for rewritten metadata.
pub const METADATA_CACHE_CONTROL: &str = "public, max-age=300";

/// Cache policy for tarballs, which never change once published.
pub const TARBALL_CACHE_CONTROL: &str = "public, max-age=86400, immutable";

/// Longest window a request path may ask for: 365 days.
pub const MAX_OVERRIDE_MINUTES: u64 = 365 * MINUTES_PER_DAY;

/// Per-request serving settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeSettings {
    /// Whether the quarantine applies.
    pub enabled: bool,
    /// The policy applied when enabled.
    pub policy: QuarantinePolicy,
}

impl ServeSettings {
    /// Derives serving settings from loaded configuration.
    #[must_use]
    pub const fn from_config(config: &QuarantineConfig) -> Self {
        Self {
            enabled: config.enabled,
            policy: QuarantinePolicy::new(config.threshold, config.no_safe),
        }
    }

    /// Replaces the window, keeping everything else.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: QuarantineThreshold) -> Self {
        self.policy.threshold = threshold;
        self
    }
}

/// What to send back for a package metadata request.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataResponse {
    /// Serve this JSON document.
    Json(Value),
    /// Refuse the request.
    Blocked {
        /// HTTP status to use.
        status: u16,
        /// Plain-text body.
        body: &'static str,
    },
}

/// What to send back for a `/<package>/<version>` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionResponse {
    /// Forward the upstream response unchanged.
    Proxy,
    /// Refuse the request with a JSON denial.
    Denied {
        /// HTTP status to use.
        status: u16,
        /// JSON payload.
        body: QuarantineDenial,
    },
}

/// JSON payload explaining why a version was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineDenial {
    /// Fixed error label.
    pub error: String,
    /// Human-readable message naming `package@version`.
    pub message: String,
    /// The window that was in force.
    pub policy: DenialPolicy,
    /// Newest version that is old enough, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_safe_version: Option<String>,
}

/// Policy details embedded in a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DenialPolicy {
    /// Window length in minutes.
    pub threshold_minutes: u64,
}

/// How an upstream response should be relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// JSON metadata that goes through the policy engine.
    Metadata,
    /// Anything else; the client is redirected upstream.
    Redirect,
}

/// A request path, split into what the proxy needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/<package>` or `/@scope/<package>`.
    Metadata {
        /// Package name, scope included.
        package: String,
    },
    /// `/<package>/<version>` or `/@scope/<package>/<version>`.
    Version {
        /// Package name, scope included.
        package: String,
        /// Requested version or tag.
        version: String,
    },
    /// Tarballs and every other path.
    Other,
}

/// Splits a request path into a [`Route`].
///
/// An encoded scope separator (`@scope%2fname`) is accepted in place of `/`.
///
/// # Examples
///
/// ```
/// use npm_quarantine::serve::{Route, parse_route};
///
/// assert_eq!(
///     parse_route("/@types%2fnode/20.1.0"),
///     Route::Version { package: "@types/node".into(), version: "20.1.0".into() }
/// );
/// assert_eq!(parse_route("/left-pad/-/left-pad-1.3.0.tgz"), Route::Other);
/// ```
#[must_use]
pub fn parse_route(path: &str) -> Route {
    let decoded = path.replace("%2f", "/").replace("%2F", "/");
    let segments: Vec<&str> = decoded.split('/').filter(|s| !s.is_empty()).collect();
    let (package, rest) = match segments.as_slice() {
        [scope, name, rest @ ..] if scope.starts_with('@') => (format!("{scope}/{name}"), rest),
        [name, rest @ ..] if !name.starts_with('@') => ((*name).to_owned(), rest),
        _ => return Route::Other,
    };
    match rest {
        [] => Route::Metadata { package },
        [version] if *version != "-" => Route::Version {
            package,
            version: (*version).to_owned(),
        },
        _ => Route::Other,
    }
}

/// Decides whether an upstream response is metadata.
///
/// # Examples
///
/// ```
/// use npm_quarantine::serve::{ContentKind, classify_content_type};
///
/// assert_eq!(
///     classify_content_type(Some("application/json; charset=utf-8")),
///     ContentKind::Metadata
/// );
/// assert_eq!(
///     classify_content_type(Some("application/octet-stream")),
///     ContentKind::Redirect
/// );
/// assert_eq!(classify_content_type(None), ContentKind::Redirect);
/// ```
#[must_use]
pub fn classify_content_type(content_type: Option<&str>) -> ContentKind {
    match content_type {
        Some(value) if value.to_ascii_lowercase().contains("application/json") => {
            ContentKind::Metadata
        }
        _ => ContentKind::Redirect,
    }
}

/// Returns the `Cache-Control` value for a relayed response, if any.
///
/// Metadata is cached briefly because the quarantine moves with the clock;
/// tarballs are immutable.
#[must_use]
pub fn cache_control(kind: ContentKind, path: &str) -> Option<&'static str> {
    match kind {
        ContentKind::Metadata => Some(METADATA_CACHE_CONTROL),
        ContentKind::Redirect if path.ends_with(".tgz") => Some(TARBALL_CACHE_CONTROL),
        ContentKind::Redirect => None,
    }
}

/// Reads a `/d/<days>`, `/h/<hours>` or `/m/<minutes>` prefix.
///
/// Returns the window to use and the upstream path that remains. Values are
/// clamped to 365 days; a value that is not a finite number falls back to
/// `default`. Paths without a prefix are returned as-is with `default`.
///
/// # Examples
///
/// ```
/// use npm_quarantine::serve::split_threshold_override;
/// use npm_quarantine_common::threshold::QuarantineThreshold;
///
/// let default = QuarantineThreshold::default();
/// let (window, rest) = split_threshold_override("/h/2/left-pad", default);
/// assert_eq!(window.minutes(), 120);
/// assert_eq!(rest, "/left-pad");
///
/// let (window, rest) = split_threshold_override("/d/abc/left-pad", default);
/// assert_eq!(window, default);
/// assert_eq!(rest, "/left-pad");
/// ```
#[must_use]
pub fn split_threshold_override(
    path: &str,
    default: QuarantineThreshold,
) -> (QuarantineThreshold, String) {
    const UNITS: [(&str, f64); 3] = [("/d/", 1440.0), ("/h/", 60.0), ("/m/", 1.0)];

    let Some((rest, minutes_per_unit)) = UNITS
        .iter()
        .find_map(|&(prefix, factor)| path.strip_prefix(prefix).map(|rest| (rest, factor)))
    else {
        return (default, path.to_owned());
    };

    let (raw, remainder) = rest.split_once('/').unwrap_or((rest, ""));
    let remainder = format!("/{remainder}");

    let threshold = match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => {
            let max_units = max_override_units(minutes_per_unit);
            QuarantineThreshold::from_raw_minutes(value.clamp(0.0, max_units) * minutes_per_unit)
        }
        _ => default,
    };
    (threshold, remainder)
}

#[expect(
    clippy::cast_precision_loss,
    reason = "MAX_OVERRIDE_MINUTES is far below 2^52 and converts exactly"
)]
fn max_override_units(minutes_per_unit: f64) -> f64 {
    MAX_OVERRIDE_MINUTES as f64 / minutes_per_unit
}

/// Applies the quarantine to a metadata document fetched for `path`.
///
/// Documents that are not package metadata, and every document while the
/// quarantine is disabled, are served untouched.
#[must_use]
pub fn handle_metadata(
    path: &str,
    document: Value,
    settings: ServeSettings,
    now: DateTime<Utc>,
) -> MetadataResponse {
    if !settings.enabled {
        return MetadataResponse::Json(document);
    }
    let metadata = match PackageMetadata::from_value(document) {
        Ok(metadata) => metadata,
        Err(error) => {
            log::debug!("passthrough path={path}: {error}");
            return MetadataResponse::Json(error.into_document());
        }
    };

    let before = metadata.latest().map(str::to_owned);
    match settings.policy.apply(metadata, now) {
        PolicyOutcome::Served { metadata, report } => {
            if report.latest_replaced() {
                log::info!(
                    "quarantine path={path} before={} after={} minutes={} policy={}",
                    before.as_deref().unwrap_or("n/a"),
                    metadata.latest().unwrap_or("n/a"),
                    settings.policy.threshold.minutes(),
                    settings.policy.no_safe,
                );
            }
            MetadataResponse::Json(metadata.into_value())
        }
        PolicyOutcome::Blocked(_) => MetadataResponse::Blocked {
            status: BLOCKED_STATUS,
            body: BLOCKED_BODY,
        },
    }
}

/// Decides whether a direct version request may be proxied.
///
/// `document` is the package metadata fetched for `package`.
#[must_use]
pub fn handle_version(
    package: &str,
    version: &str,
    document: Value,
    settings: ServeSettings,
    now: DateTime<Utc>,
) -> VersionResponse {
    if !settings.enabled {
        return VersionResponse::Proxy;
    }
    let Ok(metadata) = PackageMetadata::from_value(document) else {
        return VersionResponse::Proxy;
    };
    let Some(times) = metadata.time.as_ref() else {
        return VersionResponse::Proxy;
    };

    let result = settings.policy.lookup(version, times, now);
    if !result.quarantined {
        return VersionResponse::Proxy;
    }

    log::warn!(
        "quarantine-hit package={package} version={version} latestSafe={}",
        result.latest_safe_version.as_deref().unwrap_or("n/a")
    );
    VersionResponse::Denied {
        status: DENIED_STATUS,
        body: QuarantineDenial {
            error: DENIAL_ERROR.to_owned(),
            message: format!("Version '{package}@{version}' is currently under quarantine."),
            policy: DenialPolicy {
                threshold_minutes: settings.policy.threshold.minutes(),
            },
            latest_safe_version: result.latest_safe_version,
        },
    }
}
