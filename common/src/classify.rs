//! Safe-version classification.
//!
//! Sorts every version in a publish-time map into one of three buckets:
//! safe (old enough), quarantined (too young), or unknown (the key is not a
//! version, or its timestamp does not parse). Unknown entries are inert: the
//! engine neither trusts nor blocks them.

use crate::metadata::PublishTimes;
use crate::threshold::QuarantineThreshold;
use crate::version::{greatest_version, is_valid_version};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// How a single version string is treated by the quarantine policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStatus {
    /// Old enough to be trusted.
    Safe,
    /// Published too recently.
    Quarantined,
    /// Not a version, or no usable publish time.
    Unknown,
}

/// Classifies one version against the publish-time map.
#[must_use]
pub fn version_status(
    version: &str,
    times: &PublishTimes,
    now: DateTime<Utc>,
    threshold: QuarantineThreshold,
) -> VersionStatus {
    if !is_valid_version(version) {
        return VersionStatus::Unknown;
    }
    match times.published_at(version) {
        Some(published) if threshold.is_satisfied_by(published, now) => VersionStatus::Safe,
        Some(_) => VersionStatus::Quarantined,
        None => VersionStatus::Unknown,
    }
}

/// The set of versions old enough to trust, recomputed per request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafeVersions(BTreeSet<String>);

impl SafeVersions {
    /// Returns `true` when `version` is safe.
    #[must_use]
    pub fn contains(&self, version: &str) -> bool {
        self.0.contains(version)
    }

    /// Returns the semantically greatest safe version.
    ///
    /// Ordering is by semver precedence only; publish recency plays no part.
    #[must_use]
    pub fn greatest(&self) -> Option<&str> {
        greatest_version(self.0.iter().map(String::as_str))
    }

    /// Returns the number of safe versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when nothing is safe.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the safe versions in string order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Computes the safe-version set.
///
/// Sentinel keys (`created`, `modified`), keys that are not semantic
/// versions, and entries with unparseable timestamps are skipped. A version
/// whose age equals the threshold is safe.
///
/// # Examples
///
/// ```
/// use chrono::{DateTime, Utc};
/// use npm_quarantine_common::classify::classify;
/// use npm_quarantine_common::metadata::PublishTimes;
/// use npm_quarantine_common::threshold::QuarantineThreshold;
///
/// let now: DateTime<Utc> = "2025-12-01T12:00:00Z".parse().expect("valid");
/// let times: PublishTimes = [
///     ("1.0.0", "2025-11-28T00:00:00Z"),
///     ("2.0.0", "2025-12-01T11:30:00Z"),
///     ("created", "2020-01-01T00:00:00Z"),
/// ]
/// .into_iter()
/// .collect();
///
/// let safe = classify(&times, now, QuarantineThreshold::from_minutes(60));
/// assert!(safe.contains("1.0.0"));
/// assert!(!safe.contains("2.0.0"));
/// assert!(!safe.contains("created"));
/// ```
#[must_use]
pub fn classify(
    times: &PublishTimes,
    now: DateTime<Utc>,
    threshold: QuarantineThreshold,
) -> SafeVersions {
    let safe: BTreeSet<String> = times
        .entries()
        .map(|(version, _)| version)
        .filter(|version| version_status(version, times, now, threshold) == VersionStatus::Safe)
        .map(str::to_owned)
        .collect();
    log::debug!(
        "classified {} safe version(s) with a {threshold} window",
        safe.len()
    );
    SafeVersions(safe)
}
