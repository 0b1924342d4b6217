//! Semantic version parsing and ordering with npm's conventions.
//!
//! Registry documents key everything by version strings. This module decides
//! which of those strings are real versions and orders them by semver
//! precedence, so callers never compare raw strings.

use semver::Version;
use std::cmp::Ordering;

/// Parses a version string the way npm's `semver.valid` does.
///
/// Surrounding whitespace is trimmed and a single leading `v` is accepted.
/// Anything else that is not a full `major.minor.patch` version (optionally
/// with pre-release and build metadata) yields `None`, including the `=`
/// prefix that ranges allow.
///
/// # Examples
///
/// ```
/// use npm_quarantine_common::version::parse_version;
///
/// assert!(parse_version("1.2.3").is_some());
/// assert!(parse_version("v1.2.3-beta.1").is_some());
/// assert!(parse_version("created").is_none());
/// assert!(parse_version("1.2").is_none());
/// ```
#[must_use]
pub fn parse_version(input: &str) -> Option<Version> {
    let trimmed = input.trim();
    Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed)).ok()
}

/// Returns `true` when `input` is a valid semantic version.
#[must_use]
pub fn is_valid_version(input: &str) -> bool {
    parse_version(input).is_some()
}

/// Compares two versions by semver precedence.
///
/// Build metadata does not participate, and a release sorts above any of its
/// pre-releases.
#[must_use]
pub fn compare_precedence(left: &Version, right: &Version) -> Ordering {
    (left.major, left.minor, left.patch)
        .cmp(&(right.major, right.minor, right.patch))
        .then_with(|| left.pre.cmp(&right.pre))
}

/// Picks the semantically greatest version from a set of version strings.
///
/// Strings that are not valid versions are ignored. When two strings have
/// equal precedence (for example `1.0.0` and `1.0.0+build`), the first one
/// encountered wins, which keeps the choice independent of publish times.
///
/// # Examples
///
/// ```
/// use npm_quarantine_common::version::greatest_version;
///
/// let versions = ["1.10.0", "1.9.0", "2.0.0-rc.1", "not-a-version"];
/// assert_eq!(greatest_version(versions), Some("2.0.0-rc.1"));
/// ```
#[must_use]
pub fn greatest_version<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, Version)> = None;
    for candidate in candidates {
        let Some(parsed) = parse_version(candidate) else {
            continue;
        };
        let replace = best
            .as_ref()
            .is_none_or(|(_, current)| compare_precedence(&parsed, current) == Ordering::Greater);
        if replace {
            best = Some((candidate, parsed));
        }
    }
    best.map(|(raw, _)| raw)
}
