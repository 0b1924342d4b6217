//! Deciding how to fix a quarantined dependency.
//!
//! Only quarantined dependencies with a safe alternative are remediated. An
//! exact pin is swapped for the safe version. A range is kept when the
//! lockfile already holds the safe version; otherwise it is pinned to it,
//! optionally keeping the range's `^`/`~` operator.

use crate::install::InstallProbe;
use crate::manifest::{DependencyKind, DependencySpec};
use npm_quarantine_common::is_valid_version;
use serde::Serialize;

/// Operator re-applied in prefix mode when the range carries none.
pub const DEFAULT_PREFIX: char = '^';

/// The chosen fix for one quarantined dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Remedy {
    /// An exact pin is replaced with the safe version.
    ReplacePin {
        /// New specifier.
        target: String,
    },
    /// The range stays because the installed, locked copy is already safe.
    Keep {
        /// Installed version.
        locked: String,
    },
    /// The range is narrowed to the safe version.
    Pin {
        /// New specifier.
        target: String,
    },
}

impl Remedy {
    /// New specifier text, when the remedy changes the manifest.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::ReplacePin { target } | Self::Pin { target } => Some(target),
            Self::Keep { .. } => None,
        }
    }
}

/// Picks the remedy for `dependency` given its safe alternative.
///
/// Returns `None` when the new specifier would equal the current one.
///
/// # Examples
///
/// ```
/// use npm_quarantine_audit::install::NodeModulesProbe;
/// use npm_quarantine_audit::manifest::{DependencyKind, DependencySpec};
/// use npm_quarantine_audit::remediation::{Remedy, decide};
///
/// let probe = NodeModulesProbe::new("/nonexistent");
/// let dep = DependencySpec::new("left-pad", "~1.2.0", DependencyKind::Dependencies);
///
/// assert_eq!(
///     decide(&dep, "1.2.3", false, &probe),
///     Some(Remedy::Pin { target: "1.2.3".to_owned() })
/// );
/// assert_eq!(
///     decide(&dep, "1.2.3", true, &probe),
///     Some(Remedy::Pin { target: "~1.2.3".to_owned() })
/// );
/// ```
#[must_use]
pub fn decide(
    dependency: &DependencySpec,
    latest_safe: &str,
    prefix: bool,
    probe: &dyn InstallProbe,
) -> Option<Remedy> {
    let current = dependency.range.as_str();

    if is_valid_version(current) {
        return (current != latest_safe).then(|| Remedy::ReplacePin {
            target: latest_safe.to_owned(),
        });
    }

    let locked = probe
        .installed_version(&dependency.name)
        .filter(|installed| installed == latest_safe)
        .filter(|_| probe.has_lockfile());
    if let Some(installed) = locked {
        return Some(Remedy::Keep { locked: installed });
    }

    let target = if prefix {
        prefixed(current, latest_safe)
    } else {
        latest_safe.to_owned()
    };
    (target != current).then_some(Remedy::Pin { target })
}

fn prefixed(current: &str, version: &str) -> String {
    let operator = current
        .chars()
        .next()
        .filter(|first| matches!(first, '^' | '~'))
        .unwrap_or(DEFAULT_PREFIX);
    if version.starts_with(operator) {
        version.to_owned()
    } else {
        format!("{operator}{version}")
    }
}

/// One manifest edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChange {
    /// Dependency name.
    pub name: String,
    /// Specifier currently in the manifest.
    pub current: String,
    /// Specifier to write.
    pub target: String,
    /// Section the dependency lives in.
    pub kind: DependencyKind,
}

impl PlannedChange {
    /// Builds a change.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        current: impl Into<String>,
        target: impl Into<String>,
        kind: DependencyKind,
    ) -> Self {
        Self {
            name: name.into(),
            current: current.into(),
            target: target.into(),
            kind,
        }
    }
}

/// The manifest edits of one audit, keyed by dependency name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RemediationPlan(Vec<PlannedChange>);

impl RemediationPlan {
    /// Adds a change, replacing any earlier change for the same name.
    pub fn push(&mut self, change: PlannedChange) {
        match self.0.iter_mut().find(|existing| existing.name == change.name) {
            Some(existing) => *existing = change,
            None => self.0.push(change),
        }
    }

    /// Looks up the change planned for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PlannedChange> {
        self.0.iter().find(|change| change.name == name)
    }

    /// Iterates over the changes in planning order.
    pub fn iter(&self) -> impl Iterator<Item = &PlannedChange> {
        self.0.iter()
    }

    /// The changes in planning order.
    #[must_use]
    pub fn as_slice(&self) -> &[PlannedChange] {
        &self.0
    }

    /// Returns the number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
