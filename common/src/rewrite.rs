//! Dist-tag and versions-catalog rewriting.
//!
//! The rewriter removes quarantined versions from a metadata document and
//! repoints tags so that an install resolving `latest` (or any other tag)
//! never lands on a version that is still inside the quarantine window.

use crate::classify::{SafeVersions, VersionStatus, classify, version_status};
use crate::metadata::{
    DistTags, LATEST_TAG, PublishTimes, QUARANTINE_LATEST_TAG, VersionsCatalog,
};
use crate::threshold::QuarantineThreshold;
use crate::version::is_valid_version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do when `latest` is quarantined and no safe version remains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoSafePolicy {
    /// Leave `latest` absent; installs of the bare package name will fail
    /// to resolve.
    #[default]
    SetSafe,
    /// Refuse to serve the document at all.
    Fail,
}

impl NoSafePolicy {
    /// Returns the configuration spelling of the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SetSafe => "set-safe",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for NoSafePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown policy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid no-safe policy `{value}`; allowed: set-safe|fail")]
pub struct InvalidNoSafePolicy {
    /// The rejected input.
    pub value: String,
}

impl FromStr for NoSafePolicy {
    type Err = InvalidNoSafePolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set-safe" => Ok(Self::SetSafe),
            "fail" => Ok(Self::Fail),
            other => Err(InvalidNoSafePolicy {
                value: other.to_owned(),
            }),
        }
    }
}

/// The `fail` policy refused a document because no safe `latest` exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no safe version available for `latest` under a {threshold} quarantine")]
pub struct QuarantineBlocked {
    /// The window that was in force.
    pub threshold: QuarantineThreshold,
    /// The `latest` value upstream advertised.
    pub quarantined_latest: String,
}

/// Summary of the changes a rewrite made.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    /// Catalog keys that were removed.
    pub removed_versions: Vec<String>,
    /// Tags that were removed because they pointed at quarantined versions.
    pub removed_tags: Vec<String>,
    /// `latest` as upstream advertised it, when it was quarantined.
    pub quarantined_latest: Option<String>,
    /// `latest` after the rewrite, when `latest` was replaced.
    pub promoted_latest: Option<String>,
}

impl RewriteReport {
    /// Returns `true` when the rewrite left the document untouched.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.removed_versions.is_empty() && self.removed_tags.is_empty()
    }

    /// Returns `true` when `latest` was quarantined.
    #[must_use]
    pub fn latest_replaced(&self) -> bool {
        self.quarantined_latest.is_some()
    }
}

/// Inputs shared by every rewrite call.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext {
    /// Reference time used for every age computation.
    pub now: DateTime<Utc>,
    /// The quarantine window.
    pub threshold: QuarantineThreshold,
    /// Behaviour when `latest` has no safe replacement.
    pub no_safe: NoSafePolicy,
}

/// Rewrites dist-tags and the versions catalog in place.
///
/// Steps, in order:
///
/// 1. compute the safe set from `times`;
/// 2. drop every valid-semver catalog key that is not safe;
/// 3. drop every tag pointing at a quarantined version, preserving an
///    unsafe `latest` under `quarantine-latest`;
/// 4. when `latest` was dropped, point it at the greatest safe version.
///
/// Tags pointing at versions that are not semver, or that have no usable
/// publish time, are left in place: missing data is not treated as a reason
/// to distrust a tag. `quarantine-latest` itself is never filtered.
///
/// # Errors
///
/// Under [`NoSafePolicy::Fail`], returns [`QuarantineBlocked`] when `latest`
/// had to be dropped and nothing safe remains. The tags and catalog have
/// already been modified at that point; callers must discard them.
pub fn rewrite(
    dist_tags: &mut DistTags,
    times: &PublishTimes,
    versions: Option<&mut VersionsCatalog>,
    context: RewriteContext,
) -> Result<RewriteReport, QuarantineBlocked> {
    let safe = classify(times, context.now, context.threshold);
    let mut report = RewriteReport::default();

    if let Some(catalog) = versions {
        report.removed_versions =
            catalog.retain_versions(|key| !is_valid_version(key) || safe.contains(key));
    }

    let unsafe_tags: Vec<(String, String)> = dist_tags
        .iter()
        .filter(|(tag, _)| *tag != QUARANTINE_LATEST_TAG)
        .filter(|(_, version)| {
            version_status(version, times, context.now, context.threshold)
                == VersionStatus::Quarantined
        })
        .map(|(tag, version)| (tag.to_owned(), version.to_owned()))
        .collect();

    for (tag, version) in unsafe_tags {
        if tag == LATEST_TAG {
            dist_tags.set(QUARANTINE_LATEST_TAG, version.as_str());
            report.quarantined_latest = Some(version);
        }
        dist_tags.remove(&tag);
        report.removed_tags.push(tag);
    }

    if let Some(quarantined_latest) = report.quarantined_latest.clone() {
        promote_latest(dist_tags, &safe, context, quarantined_latest, &mut report)?;
    }

    Ok(report)
}

fn promote_latest(
    dist_tags: &mut DistTags,
    safe: &SafeVersions,
    context: RewriteContext,
    quarantined_latest: String,
    report: &mut RewriteReport,
) -> Result<(), QuarantineBlocked> {
    if let Some(replacement) = safe.greatest() {
        dist_tags.set(LATEST_TAG, replacement);
        report.promoted_latest = Some(replacement.to_owned());
        return Ok(());
    }

    match context.no_safe {
        NoSafePolicy::SetSafe => Ok(()),
        NoSafePolicy::Fail => Err(QuarantineBlocked {
            threshold: context.threshold,
            quarantined_latest,
        }),
    }
}
