//! The quarantine window.
//!
//! A [`QuarantineThreshold`] is a whole number of minutes. Raw values coming
//! from configuration files or request paths are coerced rather than
//! rejected: negative and non-finite values disable the quarantine and
//! fractions are floored.

use chrono::{DateTime, Utc};
use std::fmt;

/// Minutes in one day.
pub const MINUTES_PER_DAY: u64 = 24 * 60;

/// Default quarantine window: 21 days.
pub const DEFAULT_THRESHOLD_MINUTES: u64 = 21 * MINUTES_PER_DAY;

/// Minimum age a version must reach before it is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuarantineThreshold(u64);

impl QuarantineThreshold {
    /// A zero-minute window; every version with a past publish time is safe.
    pub const DISABLED: Self = Self(0);

    /// Creates a threshold of `minutes`.
    #[must_use]
    pub const fn from_minutes(minutes: u64) -> Self {
        Self(minutes)
    }

    /// Creates a threshold of whole `days`.
    #[must_use]
    pub const fn from_days(days: u64) -> Self {
        Self(days.saturating_mul(MINUTES_PER_DAY))
    }

    /// Coerces an untrusted numeric value into a threshold.
    ///
    /// # Examples
    ///
    /// ```
    /// use npm_quarantine_common::threshold::QuarantineThreshold;
    ///
    /// assert_eq!(QuarantineThreshold::from_raw_minutes(90.7).minutes(), 90);
    /// assert_eq!(QuarantineThreshold::from_raw_minutes(-5.0).minutes(), 0);
    /// assert_eq!(QuarantineThreshold::from_raw_minutes(f64::NAN).minutes(), 0);
    /// ```
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "value is finite, non-negative and floored; `as` saturates at u64::MAX"
    )]
    pub fn from_raw_minutes(raw: f64) -> Self {
        if !raw.is_finite() || raw < 0.0 {
            return Self::DISABLED;
        }
        Self(raw.floor() as u64)
    }

    /// Returns the window length in minutes.
    #[must_use]
    pub const fn minutes(self) -> u64 {
        self.0
    }

    /// Returns `true` when the window is zero minutes long.
    #[must_use]
    pub const fn is_disabled(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` when something published at `published` is at least
    /// as old as the window at `now`.
    ///
    /// The comparison is made in whole milliseconds, so a version published
    /// exactly one window ago counts as old enough.
    #[must_use]
    pub fn is_satisfied_by(self, published: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age_millis = now.signed_duration_since(published).num_milliseconds();
        i64::try_from(self.0)
            .ok()
            .and_then(|minutes| minutes.checked_mul(60_000))
            .is_some_and(|window_millis| age_millis >= window_millis)
    }
}

impl Default for QuarantineThreshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD_MINUTES)
    }
}

impl fmt::Display for QuarantineThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} minutes", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-12-01T12:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[rstest]
    #[case::older(61, true)]
    #[case::exactly_at_boundary(60, true)]
    #[case::younger(59, false)]
    fn boundary_is_inclusive(#[case] age_minutes: i64, #[case] expected: bool) {
        let published = now() - TimeDelta::minutes(age_minutes);
        let threshold = QuarantineThreshold::from_minutes(60);
        assert_eq!(threshold.is_satisfied_by(published, now()), expected);
    }

    #[test]
    fn one_millisecond_short_is_not_enough() {
        let published = now() - TimeDelta::minutes(60) + TimeDelta::milliseconds(1);
        let threshold = QuarantineThreshold::from_minutes(60);
        assert!(!threshold.is_satisfied_by(published, now()));
    }

    #[test]
    fn future_publish_times_are_never_old_enough() {
        let published = now() + TimeDelta::minutes(5);
        assert!(!QuarantineThreshold::DISABLED.is_satisfied_by(published, now()));
    }

    #[test]
    fn overflowing_windows_are_never_satisfied() {
        let threshold = QuarantineThreshold::from_minutes(u64::MAX);
        let published = now() - TimeDelta::days(365 * 100);
        assert!(!threshold.is_satisfied_by(published, now()));
    }

    #[rstest]
    #[case::negative(-1.0, 0)]
    #[case::infinite(f64::INFINITY, 0)]
    #[case::fraction(0.99, 0)]
    #[case::whole(30_240.0, 30_240)]
    fn raw_minutes_are_coerced(#[case] raw: f64, #[case] expected: u64) {
        assert_eq!(QuarantineThreshold::from_raw_minutes(raw).minutes(), expected);
    }

    #[test]
    fn default_is_three_weeks() {
        assert_eq!(QuarantineThreshold::default(), QuarantineThreshold::from_days(21));
    }
}
