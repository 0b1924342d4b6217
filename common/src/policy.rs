//! The quarantine policy engine.
//!
//! [`QuarantinePolicy`] is the value object every entry point receives. It
//! owns no state beyond its two settings, so the serving layer and the audit
//! resolver can share one copy across threads.

use crate::lookup::{VersionLookup, lookup};
use crate::metadata::{PackageMetadata, PublishTimes};
use crate::rewrite::{
    NoSafePolicy, QuarantineBlocked, RewriteContext, RewriteReport, rewrite,
};
use crate::threshold::QuarantineThreshold;
use chrono::{DateTime, Utc};

/// Settings that decide which versions are trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct QuarantinePolicy {
    /// Minimum age before a version is trusted.
    pub threshold: QuarantineThreshold,
    /// Behaviour when `latest` has no safe replacement.
    pub no_safe: NoSafePolicy,
}

/// Result of running a metadata document through the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyOutcome {
    /// The document may be served.
    Served {
        /// The rewritten document.
        metadata: PackageMetadata,
        /// What the rewrite changed.
        report: RewriteReport,
    },
    /// The `fail` policy refused the document.
    Blocked(QuarantineBlocked),
}

impl PolicyOutcome {
    /// Returns `true` for [`PolicyOutcome::Blocked`].
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

impl QuarantinePolicy {
    /// Builds a policy from its parts.
    #[must_use]
    pub const fn new(threshold: QuarantineThreshold, no_safe: NoSafePolicy) -> Self {
        Self { threshold, no_safe }
    }

    /// Applies the quarantine to a metadata document.
    ///
    /// The document is consumed: when the policy blocks, the partially
    /// rewritten copy is dropped with it and cannot be served by mistake.
    /// Documents without a `time` map carry nothing to classify and are
    /// returned unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{DateTime, Utc};
    /// use npm_quarantine_common::metadata::PackageMetadata;
    /// use npm_quarantine_common::policy::{PolicyOutcome, QuarantinePolicy};
    /// use npm_quarantine_common::rewrite::NoSafePolicy;
    /// use npm_quarantine_common::threshold::QuarantineThreshold;
    /// use serde_json::json;
    ///
    /// let now: DateTime<Utc> = "2025-12-01T12:00:00Z".parse().expect("valid");
    /// let doc = PackageMetadata::from_value(json!({
    ///     "dist-tags": {"latest": "2.0.0"},
    ///     "time": {
    ///         "1.0.0": "2025-11-28T08:40:00Z",
    ///         "2.0.0": "2025-12-01T11:30:00Z"
    ///     }
    /// }))
    /// .expect("valid metadata");
    ///
    /// let policy = QuarantinePolicy::new(
    ///     QuarantineThreshold::from_minutes(60),
    ///     NoSafePolicy::SetSafe,
    /// );
    /// let PolicyOutcome::Served { metadata, .. } = policy.apply(doc, now) else {
    ///     panic!("set-safe never blocks");
    /// };
    /// assert_eq!(metadata.latest(), Some("1.0.0"));
    /// assert_eq!(metadata.quarantine_latest(), Some("2.0.0"));
    /// ```
    #[must_use]
    pub fn apply(&self, mut metadata: PackageMetadata, now: DateTime<Utc>) -> PolicyOutcome {
        let Some(times) = metadata.time.as_ref() else {
            return PolicyOutcome::Served {
                metadata,
                report: RewriteReport::default(),
            };
        };

        let had_tags = metadata.dist_tags.is_some();
        let mut tags = metadata.dist_tags.take().unwrap_or_default();
        let context = RewriteContext {
            now,
            threshold: self.threshold,
            no_safe: self.no_safe,
        };
        match rewrite(&mut tags, times, metadata.versions.as_mut(), context) {
            Ok(report) => {
                if had_tags || !tags.is_empty() {
                    metadata.dist_tags = Some(tags);
                }
                PolicyOutcome::Served { metadata, report }
            }
            Err(blocked) => {
                log::warn!(
                    "blocked: latest={} threshold={}",
                    blocked.quarantined_latest,
                    blocked.threshold
                );
                PolicyOutcome::Blocked(blocked)
            }
        }
    }

    /// Checks one version against the policy window.
    #[must_use]
    pub fn lookup(&self, version: &str, times: &PublishTimes, now: DateTime<Utc>) -> VersionLookup {
        lookup(version, times, now, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::{Value, json};

    #[fixture]
    fn now() -> DateTime<Utc> {
        "2025-12-01T12:00:00Z".parse().expect("valid timestamp")
    }

    fn policy(no_safe: NoSafePolicy) -> QuarantinePolicy {
        QuarantinePolicy::new(QuarantineThreshold::from_minutes(60), no_safe)
    }

    fn young_only() -> Value {
        json!({
            "name": "fresh",
            "dist-tags": {"latest": "1.0.0"},
            "time": {"1.0.0": "2025-12-01T11:50:00Z"},
            "versions": {"1.0.0": {"version": "1.0.0"}}
        })
    }

    #[rstest]
    fn fail_policy_blocks_without_returning_the_document(now: DateTime<Utc>) {
        let doc = PackageMetadata::from_value(young_only()).expect("valid metadata");
        let outcome = policy(NoSafePolicy::Fail).apply(doc, now);
        assert!(outcome.is_blocked());
    }

    #[rstest]
    fn set_safe_serves_without_latest(now: DateTime<Utc>) {
        let doc = PackageMetadata::from_value(young_only()).expect("valid metadata");
        let PolicyOutcome::Served { metadata, report } = policy(NoSafePolicy::SetSafe).apply(doc, now)
        else {
            panic!("set-safe must serve");
        };
        assert_eq!(metadata.latest(), None);
        assert_eq!(metadata.quarantine_latest(), Some("1.0.0"));
        assert_eq!(report.removed_versions, vec!["1.0.0".to_owned()]);
        assert_eq!(metadata.other.get("name"), Some(&json!("fresh")));
    }

    #[rstest]
    fn documents_without_times_are_untouched(now: DateTime<Utc>) {
        let raw = json!({"dist-tags": {"latest": "1.0.0"}, "versions": {"1.0.0": {}}});
        let doc = PackageMetadata::from_value(raw.clone()).expect("valid metadata");
        let PolicyOutcome::Served { metadata, report } = policy(NoSafePolicy::Fail).apply(doc, now)
        else {
            panic!("nothing to classify");
        };
        assert!(report.is_noop());
        assert_eq!(metadata.into_value(), raw);
    }

    #[rstest]
    fn missing_dist_tags_stay_missing(now: DateTime<Utc>) {
        let raw = json!({
            "time": {"1.0.0": "2025-01-01T00:00:00Z"},
            "versions": {"1.0.0": {}}
        });
        let doc = PackageMetadata::from_value(raw.clone()).expect("valid metadata");
        let PolicyOutcome::Served { metadata, .. } = policy(NoSafePolicy::SetSafe).apply(doc, now)
        else {
            panic!("nothing to block");
        };
        assert_eq!(metadata.into_value(), raw);
    }

    #[rstest]
    fn blocking_logs_a_warning(now: DateTime<Utc>) {
        let mut logger = logtest::Logger::start();
        let doc = PackageMetadata::from_value(young_only()).expect("valid metadata");
        let _ = policy(NoSafePolicy::Fail).apply(doc, now);

        let mut warned = false;
        while let Some(record) = logger.pop() {
            if record.level() == log::Level::Warn
                && record.args().to_string().starts_with("blocked")
            {
                warned = true;
            }
        }
        assert!(warned, "expected a blocked warning");
    }

    #[rstest]
    fn lookup_uses_the_policy_window(now: DateTime<Utc>) {
        let times: PublishTimes = [("1.0.0", "2025-12-01T11:00:00Z")].into_iter().collect();
        assert!(!policy(NoSafePolicy::SetSafe).lookup("1.0.0", &times, now).quarantined);
        let strict = QuarantinePolicy::new(QuarantineThreshold::from_minutes(61), NoSafePolicy::SetSafe);
        assert!(strict.lookup("1.0.0", &times, now).quarantined);
    }
}
