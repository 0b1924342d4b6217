//! npm-style version ranges.
//!
//! Manifests declare dependencies with npm range syntax, which differs from
//! Cargo's: a bare `1.2.3` is an exact match, `1.2` is an X-range, and
//! hyphen ranges and `||` unions are allowed. Ranges are desugared into
//! comparator sets the same way the npm client does, so resolution against
//! registry metadata picks the version an install would pick.
//!
//! Supported syntax:
//!
//! - primitive comparators: `<`, `<=`, `>`, `>=`, `=`;
//! - X-ranges: `*`, `x`, `1.x`, `1.2.*`, `1`, `1.2`, and the empty range;
//! - tilde (`~1.2.3`, `~>1.2`) and caret (`^0.2.3`) ranges;
//! - hyphen ranges (`1.2 - 2.3.4`);
//! - unions with `||`.

use crate::version::{compare_precedence, parse_version};
use semver::{Prerelease, Version};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Errors raised when a range string cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// A comparator could not be parsed.
    #[error("invalid range `{range}`: {reason}")]
    Invalid {
        /// The full range string.
        range: String,
        /// What was wrong with it.
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    const fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    fn matches(&self, candidate: &Version) -> bool {
        let ordering = compare_precedence(candidate, &self.version);
        match self.op {
            Op::Lt => ordering == Ordering::Less,
            Op::Le => ordering != Ordering::Greater,
            Op::Gt => ordering == Ordering::Greater,
            Op::Ge => ordering != Ordering::Less,
            Op::Eq => ordering == Ordering::Equal,
        }
    }
}

/// A parsed npm version range: a union of comparator sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    raw: String,
    sets: Vec<Vec<Comparator>>,
}

impl Range {
    /// Parses an npm range string.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError::Invalid`] for anything that is not range syntax,
    /// including dist-tag names, URLs and `file:`/`npm:` specifiers.
    ///
    /// # Examples
    ///
    /// ```
    /// use npm_quarantine_common::range::Range;
    ///
    /// let range = Range::parse("^1.2.0 || ~2.0").expect("valid range");
    /// assert!(range.satisfies_str("1.9.3"));
    /// assert!(range.satisfies_str("2.0.7"));
    /// assert!(!range.satisfies_str("2.1.0"));
    ///
    /// assert!(Range::parse("latest").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let sets = input
            .split("||")
            .map(|set| parse_set(set.trim()))
            .collect::<Result<Vec<_>, String>>()
            .map_err(|reason| RangeError::Invalid {
                range: input.to_owned(),
                reason,
            })?;
        Ok(Self {
            raw: input.to_owned(),
            sets,
        })
    }

    /// Returns `true` when `version` satisfies the range.
    ///
    /// A pre-release only satisfies a comparator set when some comparator in
    /// that set names a pre-release of the same `major.minor.patch`.
    #[must_use]
    pub fn satisfies(&self, version: &Version) -> bool {
        self.sets.iter().any(|set| set_satisfied(set, version))
    }

    /// Parses `version` and checks it against the range.
    #[must_use]
    pub fn satisfies_str(&self, version: &str) -> bool {
        parse_version(version).is_some_and(|parsed| self.satisfies(&parsed))
    }

    /// Returns the greatest candidate satisfying the range.
    ///
    /// Candidates that are not valid versions are ignored.
    #[must_use]
    pub fn max_satisfying<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter_map(|raw| parse_version(raw).map(|parsed| (raw, parsed)))
            .filter(|(_, parsed)| self.satisfies(parsed))
            .max_by(|(_, left), (_, right)| compare_precedence(left, right))
            .map(|(raw, _)| raw)
    }

    /// Returns the range text as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Range {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Resolves `range` against `candidates` the way an install would.
///
/// Returns `None` when the range is not valid range syntax or nothing
/// satisfies it.
///
/// # Examples
///
/// ```
/// use npm_quarantine_common::range::max_satisfying;
///
/// let available = ["1.0.0", "1.0.1", "2.0.0"];
/// assert_eq!(max_satisfying(available, "^1.0.0"), Some("1.0.1"));
/// assert_eq!(max_satisfying(available, "1.0.0"), Some("1.0.0"));
/// assert_eq!(max_satisfying(available, "^3"), None);
/// ```
#[must_use]
pub fn max_satisfying<'a, I>(candidates: I, range: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    Range::parse(range).ok()?.max_satisfying(candidates)
}

fn set_satisfied(set: &[Comparator], version: &Version) -> bool {
    if !set.iter().all(|comparator| comparator.matches(version)) {
        return false;
    }
    if version.pre.is_empty() {
        return true;
    }
    set.iter().any(|comparator| {
        let allowed = &comparator.version;
        !allowed.pre.is_empty()
            && (allowed.major, allowed.minor, allowed.patch)
                == (version.major, version.minor, version.patch)
    })
}

/// A version with optional wildcard components.
#[derive(Debug, Clone)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
}

impl Partial {
    fn full(&self) -> Option<Version> {
        let mut version = Version::new(self.major?, self.minor?, self.patch?);
        version.pre = self.pre.clone();
        Some(version)
    }

    /// The lowest version the partial covers (wildcards become zero).
    fn floor(&self) -> Version {
        let mut version = Version::new(
            self.major.unwrap_or(0),
            self.minor.unwrap_or(0),
            self.patch.unwrap_or(0),
        );
        version.pre = self.pre.clone();
        version
    }
}

fn any() -> Vec<Comparator> {
    Vec::new()
}

fn nothing() -> Vec<Comparator> {
    vec![Comparator::new(Op::Lt, exclusive(0, 0, 0))]
}

/// `major.minor.patch-0`: the lowest version of that tuple, pre-releases
/// included, used as an exclusive upper bound.
fn exclusive(major: u64, minor: u64, patch: u64) -> Version {
    let mut version = Version::new(major, minor, patch);
    version.pre = Prerelease::new("0").unwrap_or(Prerelease::EMPTY);
    version
}

fn parse_set(set: &str) -> Result<Vec<Comparator>, String> {
    let tokens = glue_operators(set.split_whitespace().collect());

    if let [from, dash, to] = tokens.as_slice()
        && dash == "-"
    {
        return Ok(hyphen(&parse_partial(from)?, &parse_partial(to)?));
    }

    let mut comparators = Vec::new();
    for token in &tokens {
        comparators.extend(parse_comparator(token)?);
    }
    Ok(comparators)
}

/// Joins a bare operator token with the version that follows it, so
/// `>= 1.2.3` reads like `>=1.2.3`.
fn glue_operators(tokens: Vec<&str>) -> Vec<String> {
    let mut glued: Vec<String> = Vec::with_capacity(tokens.len());
    let mut pending: Option<&str> = None;
    for token in tokens {
        let is_operator =
            !token.is_empty() && token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^'));
        match pending.take() {
            Some(op) => glued.push(format!("{op}{token}")),
            None if is_operator => pending = Some(token),
            None => glued.push(token.to_owned()),
        }
    }
    if let Some(op) = pending {
        glued.push(op.to_owned());
    }
    glued
}

fn parse_comparator(token: &str) -> Result<Vec<Comparator>, String> {
    const PREFIXES: [&str; 8] = ["~>", ">=", "<=", ">", "<", "=", "~", "^"];
    let (op, body) = PREFIXES
        .iter()
        .find_map(|prefix| token.strip_prefix(prefix).map(|rest| (*prefix, rest)))
        .unwrap_or(("", token));
    let partial = parse_partial(body)?;

    Ok(match op {
        "~" | "~>" => tilde(&partial),
        "^" => caret(&partial),
        ">" => greater_than(&partial),
        ">=" => at_least(&partial),
        "<" => less_than(&partial),
        "<=" => at_most(&partial),
        _ => exact_or_x_range(&partial),
    })
}

fn parse_partial(raw: &str) -> Result<Partial, String> {
    let body = raw
        .strip_prefix('v')
        .or_else(|| raw.strip_prefix('='))
        .unwrap_or(raw);
    if body.is_empty() {
        return Ok(Partial {
            major: None,
            minor: None,
            patch: None,
            pre: Prerelease::EMPTY,
        });
    }

    let core_end = body.find(['-', '+']).unwrap_or(body.len());
    let (core, suffix) = body.split_at(core_end);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 {
        return Err(format!("`{raw}` has more than three version components"));
    }

    let mut numbers = [None; 3];
    let mut wildcard_seen = false;
    for (slot, part) in numbers.iter_mut().zip(parts.iter()) {
        let parsed = parse_component(part).ok_or_else(|| format!("`{raw}` is not a version"))?;
        if parsed.is_none() {
            wildcard_seen = true;
        }
        if !wildcard_seen {
            *slot = parsed;
        }
    }
    let [major, minor, patch] = numbers;

    if suffix.is_empty() {
        return Ok(Partial {
            major,
            minor,
            patch,
            pre: Prerelease::EMPTY,
        });
    }

    // Pre-release and build metadata are only meaningful on full versions.
    if patch.is_none() {
        return Err(format!("`{raw}` has a pre-release on a partial version"));
    }
    let full = Version::parse(body).map_err(|e| format!("`{raw}`: {e}"))?;
    Ok(Partial {
        major,
        minor,
        patch,
        pre: full.pre,
    })
}

/// Parses one numeric component: `Some(Some(n))` for a number,
/// `Some(None)` for a wildcard, `None` when invalid.
fn parse_component(part: &str) -> Option<Option<u64>> {
    match part {
        "x" | "X" | "*" => Some(None),
        digits if digits.len() > 1 && digits.starts_with('0') => None,
        digits if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse().ok().map(Some)
        }
        _ => None,
    }
}

fn exact_or_x_range(partial: &Partial) -> Vec<Comparator> {
    if let Some(version) = partial.full() {
        return vec![Comparator::new(Op::Eq, version)];
    }
    match (partial.major, partial.minor) {
        (None, _) => any(),
        (Some(major), None) => vec![
            Comparator::new(Op::Ge, partial.floor()),
            Comparator::new(Op::Lt, exclusive(major.saturating_add(1), 0, 0)),
        ],
        (Some(major), Some(minor)) => vec![
            Comparator::new(Op::Ge, partial.floor()),
            Comparator::new(Op::Lt, exclusive(major, minor.saturating_add(1), 0)),
        ],
    }
}

fn tilde(partial: &Partial) -> Vec<Comparator> {
    match (partial.major, partial.minor) {
        (None, _) => any(),
        (Some(major), None) => vec![
            Comparator::new(Op::Ge, partial.floor()),
            Comparator::new(Op::Lt, exclusive(major.saturating_add(1), 0, 0)),
        ],
        (Some(major), Some(minor)) => vec![
            Comparator::new(Op::Ge, partial.floor()),
            Comparator::new(Op::Lt, exclusive(major, minor.saturating_add(1), 0)),
        ],
    }
}

fn caret(partial: &Partial) -> Vec<Comparator> {
    let upper = match (partial.major, partial.minor, partial.patch) {
        (None, _, _) => return any(),
        (Some(major), None, _) => exclusive(major.saturating_add(1), 0, 0),
        (Some(0), Some(minor), None) => exclusive(0, minor.saturating_add(1), 0),
        (Some(major), Some(_), None) => exclusive(major.saturating_add(1), 0, 0),
        (Some(0), Some(0), Some(patch)) => exclusive(0, 0, patch.saturating_add(1)),
        (Some(0), Some(minor), Some(_)) => exclusive(0, minor.saturating_add(1), 0),
        (Some(major), Some(_), Some(_)) => exclusive(major.saturating_add(1), 0, 0),
    };
    vec![
        Comparator::new(Op::Ge, partial.floor()),
        Comparator::new(Op::Lt, upper),
    ]
}

fn greater_than(partial: &Partial) -> Vec<Comparator> {
    if let Some(version) = partial.full() {
        return vec![Comparator::new(Op::Gt, version)];
    }
    match (partial.major, partial.minor) {
        (None, _) => nothing(),
        (Some(major), None) => vec![Comparator::new(
            Op::Ge,
            Version::new(major.saturating_add(1), 0, 0),
        )],
        (Some(major), Some(minor)) => vec![Comparator::new(
            Op::Ge,
            Version::new(major, minor.saturating_add(1), 0),
        )],
    }
}

fn at_least(partial: &Partial) -> Vec<Comparator> {
    if partial.major.is_none() {
        return any();
    }
    vec![Comparator::new(Op::Ge, partial.floor())]
}

fn less_than(partial: &Partial) -> Vec<Comparator> {
    if let Some(version) = partial.full() {
        return vec![Comparator::new(Op::Lt, version)];
    }
    match (partial.major, partial.minor) {
        (None, _) => nothing(),
        (Some(major), None) => vec![Comparator::new(Op::Lt, exclusive(major, 0, 0))],
        (Some(major), Some(minor)) => vec![Comparator::new(Op::Lt, exclusive(major, minor, 0))],
    }
}

fn at_most(partial: &Partial) -> Vec<Comparator> {
    if let Some(version) = partial.full() {
        return vec![Comparator::new(Op::Le, version)];
    }
    match (partial.major, partial.minor) {
        (None, _) => any(),
        (Some(major), None) => vec![Comparator::new(
            Op::Lt,
            exclusive(major.saturating_add(1), 0, 0),
        )],
        (Some(major), Some(minor)) => vec![Comparator::new(
            Op::Lt,
            exclusive(major, minor.saturating_add(1), 0),
        )],
    }
}

fn hyphen(from: &Partial, to: &Partial) -> Vec<Comparator> {
    let mut comparators = Vec::with_capacity(2);
    if from.major.is_some() {
        comparators.push(Comparator::new(Op::Ge, from.floor()));
    }
    comparators.extend(match (to.major, to.minor) {
        (None, _) => None,
        (Some(major), None) => Some(Comparator::new(
            Op::Lt,
            exclusive(major.saturating_add(1), 0, 0),
        )),
        (Some(major), Some(minor)) => Some(match to.full() {
            Some(version) => Comparator::new(Op::Le, version),
            None => Comparator::new(Op::Lt, exclusive(major, minor.saturating_add(1), 0)),
        }),
    });
    comparators
}
