//! Resolving declared ranges against the registry and the quarantine window.
//!
//! Each dependency is fetched and judged independently on a fixed-size
//! worker pool, so no more than `concurrency` registry requests are in
//! flight. Results come back in manifest order.

use crate::error::{AuditError, Result};
use crate::manifest::DependencySpec;
use crate::registry::{FetchError, MetadataFetcher};
use chrono::{DateTime, Utc};
use npm_quarantine_common::{PackageMetadata, QuarantinePolicy, max_satisfying};
use rayon::prelude::*;
use serde_json::Value;

/// What the audit learned about one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// The resolved version is outside the quarantine window.
    Safe {
        /// Version the range resolves to.
        resolved: String,
    },
    /// The resolved version is still quarantined.
    Quarantined {
        /// Version the range resolves to.
        resolved: String,
        /// Greatest safe version of the package, if there is one.
        latest_safe: Option<String>,
    },
    /// Nothing published satisfies the range.
    Unresolvable,
    /// The registry document could not be fetched.
    FetchFailed {
        /// Why the fetch failed.
        reason: String,
    },
    /// The registry returned something that is not package metadata.
    InvalidMetadata {
        /// Why the document was rejected.
        reason: String,
    },
}

impl Finding {
    /// Returns `true` for [`Finding::Quarantined`].
    #[must_use]
    pub const fn is_quarantined(&self) -> bool {
        matches!(self, Self::Quarantined { .. })
    }
}

/// A dependency together with its finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyAudit {
    /// The dependency as declared.
    pub dependency: DependencySpec,
    /// The verdict.
    pub finding: Finding,
}

/// Judges one dependency against its fetched metadata.
///
/// The range is resolved against every version the registry lists, not just
/// the safe ones, because that is what an install would pick.
///
/// # Examples
///
/// ```
/// use chrono::{DateTime, Utc};
/// use npm_quarantine_audit::manifest::{DependencyKind, DependencySpec};
/// use npm_quarantine_audit::resolver::{Finding, evaluate};
/// use npm_quarantine_common::{NoSafePolicy, QuarantinePolicy, QuarantineThreshold};
/// use serde_json::json;
///
/// let now: DateTime<Utc> = "2025-12-01T12:00:00Z".parse().expect("valid");
/// let policy = QuarantinePolicy::new(QuarantineThreshold::from_minutes(60), NoSafePolicy::SetSafe);
/// let document = json!({
///     "versions": {"1.0.0": {}, "1.0.1": {}},
///     "time": {"1.0.0": "2025-11-01T00:00:00Z", "1.0.1": "2025-12-01T11:50:00Z"}
/// });
/// let dep = DependencySpec::new("left-pad", "^1.0.0", DependencyKind::Dependencies);
///
/// assert_eq!(
///     evaluate(&dep, Ok(document), policy, now),
///     Finding::Quarantined {
///         resolved: "1.0.1".to_owned(),
///         latest_safe: Some("1.0.0".to_owned()),
///     }
/// );
/// ```
#[must_use]
pub fn evaluate(
    dependency: &DependencySpec,
    fetched: std::result::Result<Value, FetchError>,
    policy: QuarantinePolicy,
    now: DateTime<Utc>,
) -> Finding {
    let document = match fetched {
        Ok(document) => document,
        Err(err) => {
            return Finding::FetchFailed {
                reason: err.to_string(),
            };
        }
    };
    let metadata = match PackageMetadata::from_value(document) {
        Ok(metadata) => metadata,
        Err(err) => {
            return Finding::InvalidMetadata {
                reason: err.to_string(),
            };
        }
    };

    let Some(resolved) = max_satisfying(metadata.version_keys(), &dependency.range) else {
        return Finding::Unresolvable;
    };
    let resolved = resolved.to_owned();

    let verdict = metadata
        .time
        .as_ref()
        .map(|times| policy.lookup(&resolved, times, now))
        .unwrap_or_default();
    log::debug!(
        "audit name={} range={} resolved={} quarantined={}",
        dependency.name,
        dependency.range,
        resolved,
        verdict.quarantined
    );
    if verdict.quarantined {
        Finding::Quarantined {
            resolved,
            latest_safe: verdict.latest_safe_version,
        }
    } else {
        Finding::Safe { resolved }
    }
}

/// Audits every dependency with at most `concurrency` fetches in flight.
///
/// Results are returned in the order of `dependencies`. A failed fetch only
/// affects its own dependency.
///
/// # Errors
///
/// Returns [`AuditError::WorkerPool`] when the worker pool cannot start.
pub fn resolve_all(
    dependencies: &[DependencySpec],
    fetcher: &dyn MetadataFetcher,
    policy: QuarantinePolicy,
    now: DateTime<Utc>,
    concurrency: usize,
) -> Result<Vec<DependencyAudit>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .thread_name(|index| format!("audit-fetch-{index}"))
        .build()
        .map_err(|err| AuditError::WorkerPool {
            reason: err.to_string(),
        })?;

    Ok(pool.install(|| {
        dependencies
            .par_iter()
            .map(|dependency| DependencyAudit {
                dependency: dependency.clone(),
                finding: evaluate(dependency, fetcher.fetch(&dependency.name), policy, now),
            })
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::DependencyKind;
    use crate::registry::MockMetadataFetcher;
    use npm_quarantine_common::{NoSafePolicy, QuarantineThreshold};
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn now() -> DateTime<Utc> {
        "2025-12-01T12:00:00Z".parse().expect("valid timestamp")
    }

    fn policy() -> QuarantinePolicy {
        QuarantinePolicy::new(QuarantineThreshold::from_minutes(60), NoSafePolicy::SetSafe)
    }

    fn dep(name: &str, range: &str) -> DependencySpec {
        DependencySpec::new(name, range, DependencyKind::Dependencies)
    }

    fn document() -> Value {
        json!({
            "name": "pkg",
            "dist-tags": {"latest": "2.0.0"},
            "versions": {"1.0.0": {}, "1.0.1": {}, "2.0.0": {}, "3.0.0-rc.1": {}},
            "time": {
                "created": "2020-01-01T00:00:00Z",
                "1.0.0": "2025-10-01T00:00:00Z",
                "1.0.1": "2025-12-01T11:50:00Z",
                "2.0.0": "2025-11-01T00:00:00Z",
                "3.0.0-rc.1": "2025-12-01T11:59:00Z"
            }
        })
    }

    #[rstest]
    #[case::safe_major("^2.0.0", Finding::Safe { resolved: "2.0.0".to_owned() })]
    #[case::quarantined_patch("~1.0.0", Finding::Quarantined {
        resolved: "1.0.1".to_owned(),
        latest_safe: Some("2.0.0".to_owned()),
    })]
    #[case::exact_safe("1.0.0", Finding::Safe { resolved: "1.0.0".to_owned() })]
    #[case::unresolvable("^4.0.0", Finding::Unresolvable)]
    #[case::dist_tag_name("latest", Finding::Unresolvable)]
    #[case::prerelease_needs_opt_in("*", Finding::Safe { resolved: "2.0.0".to_owned() })]
    fn ranges_resolve_against_every_listed_version(
        now: DateTime<Utc>,
        #[case] range: &str,
        #[case] expected: Finding,
    ) {
        assert_eq!(evaluate(&dep("pkg", range), Ok(document()), policy(), now), expected);
    }

    #[rstest]
    fn disabled_threshold_never_quarantines(now: DateTime<Utc>) {
        let open = QuarantinePolicy::new(QuarantineThreshold::DISABLED, NoSafePolicy::SetSafe);
        let finding = evaluate(&dep("pkg", "~1.0.0"), Ok(document()), open, now);
        assert_eq!(finding, Finding::Safe { resolved: "1.0.1".to_owned() });
    }

    #[rstest]
    fn documents_without_times_are_safe(now: DateTime<Utc>) {
        let finding = evaluate(
            &dep("pkg", "^1.0.0"),
            Ok(json!({"versions": {"1.0.0": {}}})),
            policy(),
            now,
        );
        assert_eq!(finding, Finding::Safe { resolved: "1.0.0".to_owned() });
    }

    #[rstest]
    fn fetch_failures_are_reported(now: DateTime<Utc>) {
        let failure = FetchError::NotFound {
            url: "https://registry.test/pkg".to_owned(),
        };
        let finding = evaluate(&dep("pkg", "^1.0.0"), Err(failure), policy(), now);
        let Finding::FetchFailed { reason } = finding else {
            panic!("expected a fetch failure, got {finding:?}");
        };
        assert!(reason.contains("registry.test/pkg"));
    }

    #[rstest]
    #[case::array(json!(["not", "metadata"]))]
    #[case::string_time(json!({"versions": {"1.0.0": {}}, "time": "yesterday"}))]
    fn malformed_documents_are_invalid_metadata(now: DateTime<Utc>, #[case] document: Value) {
        let finding = evaluate(&dep("pkg", "^1.0.0"), Ok(document), policy(), now);
        assert!(matches!(finding, Finding::InvalidMetadata { .. }));
    }

    #[rstest]
    fn resolve_all_keeps_manifest_order_and_isolates_failures(now: DateTime<Utc>) {
        let mut fetcher = MockMetadataFetcher::new();
        fetcher.expect_fetch().returning(|package| match package {
            "missing" => Err(FetchError::NotFound {
                url: format!("https://registry.test/{package}"),
            }),
            _ => Ok(document()),
        });
        let deps = [
            dep("a", "^2.0.0"),
            dep("missing", "^1.0.0"),
            dep("c", "~1.0.0"),
        ];

        let audits = resolve_all(&deps, &fetcher, policy(), now, 2).expect("pool starts");

        assert_eq!(
            audits.iter().map(|audit| audit.dependency.name.as_str()).collect::<Vec<_>>(),
            ["a", "missing", "c"]
        );
        assert!(matches!(audits[0].finding, Finding::Safe { .. }));
        assert!(matches!(audits[1].finding, Finding::FetchFailed { .. }));
        assert!(audits[2].finding.is_quarantined());
    }

    #[rstest]
    fn resolve_all_fetches_each_dependency_once(now: DateTime<Utc>) {
        let mut fetcher = MockMetadataFetcher::new();
        fetcher.expect_fetch().times(3).returning(|_| Ok(document()));
        let deps = [dep("a", "*"), dep("b", "*"), dep("c", "*")];

        let audits = resolve_all(&deps, &fetcher, policy(), now, 8).expect("pool starts");
        assert_eq!(audits.len(), 3);
    }

    #[rstest]
    fn decisions_are_logged_at_debug(now: DateTime<Utc>) {
        let mut logger = logtest::Logger::start();
        let _ = evaluate(&dep("logged-pkg", "~1.0.0"), Ok(document()), policy(), now);

        let mut logged = false;
        while let Some(record) = logger.pop() {
            if record.level() == log::Level::Debug
                && record
                    .args()
                    .to_string()
                    .starts_with("audit name=logged-pkg range=~1.0.0 resolved=1.0.1")
            {
                logged = true;
            }
        }
        assert!(logged, "expected a debug record for the decision");
    }
}
