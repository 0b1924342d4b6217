//! Exact-version quarantine lookups.

use crate::classify::{VersionStatus, classify, version_status};
use crate::metadata::PublishTimes;
use crate::threshold::QuarantineThreshold;
use chrono::{DateTime, Utc};

/// Outcome of asking whether one version is quarantined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionLookup {
    /// Whether the version is still inside the quarantine window.
    pub quarantined: bool,
    /// The greatest safe version, reported only for quarantined versions.
    pub latest_safe_version: Option<String>,
}

/// Answers "is `version` quarantined, and what should be used instead?".
///
/// Versions that are not semver, or that have no usable publish time, are
/// never reported as quarantined by this check.
///
/// # Examples
///
/// ```
/// use chrono::{DateTime, Utc};
/// use npm_quarantine_common::lookup::lookup;
/// use npm_quarantine_common::metadata::PublishTimes;
/// use npm_quarantine_common::threshold::QuarantineThreshold;
///
/// let now: DateTime<Utc> = "2025-12-01T12:00:00Z".parse().expect("valid");
/// let times: PublishTimes = [
///     ("1.0.0", "2025-11-01T00:00:00Z"),
///     ("1.0.1", "2025-12-01T11:55:00Z"),
/// ]
/// .into_iter()
/// .collect();
///
/// let result = lookup("1.0.1", &times, now, QuarantineThreshold::from_minutes(30));
/// assert!(result.quarantined);
/// assert_eq!(result.latest_safe_version.as_deref(), Some("1.0.0"));
/// ```
#[must_use]
pub fn lookup(
    version: &str,
    times: &PublishTimes,
    now: DateTime<Utc>,
    threshold: QuarantineThreshold,
) -> VersionLookup {
    match version_status(version, times, now, threshold) {
        VersionStatus::Quarantined => VersionLookup {
            quarantined: true,
            latest_safe_version: classify(times, now, threshold)
                .greatest()
                .map(str::to_owned),
        },
        VersionStatus::Safe | VersionStatus::Unknown => VersionLookup::default(),
    }
}
