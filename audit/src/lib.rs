//! Dependency audit against the npm quarantine window.
//!
//! The audit reads `package.json`, resolves each declared range against the
//! registry the way an install would, and reports which resolved versions
//! are still inside the quarantine window. In fix mode the manifest is
//! rewritten so the install picks a safe version instead.

pub mod cli;
pub mod error;
pub mod install;
pub mod manifest;
pub mod registry;
pub mod remediation;
pub mod report;
pub mod resolver;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use npm_quarantine_common::QuarantinePolicy;

use crate::error::Result;
use crate::install::InstallProbe;
use crate::manifest::Manifest;
use crate::registry::MetadataFetcher;
use crate::remediation::{PlannedChange, RemediationPlan, decide};
use crate::report::{AuditReport, ReportEntry};
use crate::resolver::{Finding, resolve_all};

pub use error::AuditError;

/// Settings for one audit run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOptions {
    /// Directory containing `package.json`.
    pub dir: Utf8PathBuf,
    /// Rewrite the manifest.
    pub fix: bool,
    /// Keep the range operator when pinning.
    pub prefix: bool,
    /// Window and no-safe behaviour to judge versions by.
    pub policy: QuarantinePolicy,
    /// Maximum number of registry fetches in flight.
    pub concurrency: usize,
    /// Reference time for version ages.
    pub now: DateTime<Utc>,
}

/// Runs the audit and, in fix mode, rewrites the manifest.
///
/// # Errors
///
/// Returns [`AuditError`] when the manifest cannot be read, parsed or
/// written, or when the worker pool cannot start. Problems with individual
/// dependencies are reported in the returned [`AuditReport`] instead.
pub fn run_audit(
    options: &AuditOptions,
    fetcher: &dyn MetadataFetcher,
    probe: &dyn InstallProbe,
) -> Result<AuditReport> {
    let manifest = Manifest::load(&options.dir)?;
    let mut report = AuditReport {
        fix: options.fix,
        threshold: options.policy.threshold,
        entries: Vec::new(),
        plan: RemediationPlan::default(),
        manifest_updated: false,
    };
    if manifest.dependencies().is_empty() {
        return Ok(report);
    }

    let audits = resolve_all(
        manifest.dependencies(),
        fetcher,
        options.policy,
        options.now,
        options.concurrency,
    )?;

    for audit in audits {
        let remedy = match &audit.finding {
            Finding::Quarantined {
                latest_safe: Some(safe),
                ..
            } if options.fix => decide(&audit.dependency, safe, options.prefix, probe),
            _ => None,
        };
        if let Some(target) = remedy.as_ref().and_then(|remedy| remedy.target()) {
            report.plan.push(PlannedChange::new(
                audit.dependency.name.clone(),
                audit.dependency.range.clone(),
                target,
                audit.dependency.kind,
            ));
        }
        report.entries.push(ReportEntry { audit, remedy });
    }

    if options.fix {
        report.manifest_updated = manifest.apply(&report.plan)?;
    }
    Ok(report)
}
