//! Output formatting for audit results.
//!
//! This module renders an [`AuditReport`] either as the line-oriented text an
//! operator reads in a terminal or as JSON for scripting.

use crate::error::Result;
use crate::manifest::{DependencyKind, MANIFEST_FILE};
use crate::remediation::{PlannedChange, RemediationPlan, Remedy};
use crate::resolver::{DependencyAudit, Finding};
use npm_quarantine_common::QuarantineThreshold;
use serde::Serialize;

/// One audited dependency and, in fix mode, what was decided for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// The dependency and its finding.
    pub audit: DependencyAudit,
    /// The chosen remedy, when one applies.
    pub remedy: Option<Remedy>,
}

/// Everything an audit run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    /// Whether fixes were requested.
    pub fix: bool,
    /// Window the dependencies were judged against.
    pub threshold: QuarantineThreshold,
    /// Per-dependency results in manifest order.
    pub entries: Vec<ReportEntry>,
    /// Manifest edits derived from the remedies.
    pub plan: RemediationPlan,
    /// Whether the manifest was rewritten.
    pub manifest_updated: bool,
}

impl AuditReport {
    /// Number of dependencies whose resolved version is quarantined.
    #[must_use]
    pub fn quarantined_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.audit.finding.is_quarantined())
            .count()
    }
}

/// Format an audit report for a terminal.
///
/// With `quiet` set, dependencies that resolved to a safe version are not
/// listed; problems and the summary always are.
///
/// # Examples
///
/// ```
/// use npm_quarantine_audit::remediation::RemediationPlan;
/// use npm_quarantine_audit::report::{AuditReport, format_human};
/// use npm_quarantine_common::QuarantineThreshold;
///
/// let report = AuditReport {
///     fix: false,
///     threshold: QuarantineThreshold::default(),
///     entries: Vec::new(),
///     plan: RemediationPlan::default(),
///     manifest_updated: false,
/// };
/// assert!(format_human(&report, false).contains("No dependencies found to audit."));
/// ```
#[must_use]
pub fn format_human(report: &AuditReport, quiet: bool) -> String {
    let command = if report.fix { "audit fix" } else { "audit" };
    let mut output = format!("🛡️  Running npm-quarantine {command}...\n");

    if report.entries.is_empty() {
        output.push_str("✅ No dependencies found to audit.\n");
        return output;
    }

    for entry in &report.entries {
        push_entry(&mut output, entry, quiet);
    }

    output.push_str("\nAudit finished.\n");
    let quarantined = report.quarantined_count();
    if quarantined > 0 {
        output.push_str(&format!(
            "\nFound {quarantined} quarantined package(s). These may cause 'ETARGET' errors on 'npm install'.\n"
        ));
    } else if !report.fix {
        output.push_str("\nAll dependencies are safe under the current quarantine policy.\n");
    }

    if report.fix {
        push_fixes(&mut output, report);
    }
    output
}

fn push_entry(output: &mut String, entry: &ReportEntry, quiet: bool) {
    let dependency = &entry.audit.dependency;
    let name = dependency.name.as_str();
    let range = dependency.range.as_str();
    match &entry.audit.finding {
        Finding::FetchFailed { .. } => {
            output.push_str(&format!("  ⚠️ Could not fetch metadata for {name}. Skipping.\n"));
        }
        Finding::InvalidMetadata { .. } => {
            output.push_str(&format!("  ⚠️ Invalid metadata for {name}. Skipping.\n"));
        }
        Finding::Unresolvable => {
            output.push_str(&format!(
                "  - {name}: No version satisfies \"{range}\". Skipping.\n"
            ));
        }
        Finding::Safe { resolved } => {
            if !quiet {
                output.push_str(&format!(
                    "  ✅ {name}@{resolved} (satisfies \"{range}\") is safe.\n"
                ));
            }
        }
        Finding::Quarantined {
            resolved,
            latest_safe,
        } => {
            output.push_str(&format!(
                "  🚨 {name}@{resolved} (satisfies \"{range}\") is QUARANTINED.\n"
            ));
            match latest_safe {
                Some(safe) => {
                    output.push_str(&format!("     -> Latest safe version is {safe}.\n"));
                }
                None => output.push_str("     -> No safe versions available.\n"),
            }
            if let Some(remedy) = &entry.remedy {
                push_remedy(output, range, remedy);
            }
        }
    }
}

fn push_remedy(output: &mut String, range: &str, remedy: &Remedy) {
    match remedy {
        Remedy::ReplacePin { target } => {
            output.push_str(&format!(
                "     -> Replacing exact pin with safe version {target}.\n"
            ));
        }
        Remedy::Keep { locked } => {
            output.push_str(&format!(
                "     -> Keeping spec \"{range}\" (locked safe {locked}).\n"
            ));
        }
        Remedy::Pin { .. } => {
            output.push_str("     -> Pinning to safe version to avoid future ETARGET.\n");
        }
    }
}

fn push_fixes(output: &mut String, report: &AuditReport) {
    if report.plan.is_empty() {
        output.push_str("\nNo quarantined packages to fix.\n");
        return;
    }
    output.push_str(&format!("\nApplying fixes to {MANIFEST_FILE}...\n"));
    for change in report.plan.iter() {
        output.push_str(&format!(
            "  - Auto-fix: Changing {} from \"{}\" to \"{}\"\n",
            change.name, change.current, change.target
        ));
    }
    if report.manifest_updated {
        output.push_str(&format!(
            "\n✅ {MANIFEST_FILE} has been updated. Please run \"npm install\".\n"
        ));
    }
}

/// Format an audit report as JSON.
///
/// # Examples
///
/// ```
/// use npm_quarantine_audit::remediation::RemediationPlan;
/// use npm_quarantine_audit::report::{AuditReport, format_json};
/// use npm_quarantine_common::QuarantineThreshold;
///
/// let report = AuditReport {
///     fix: false,
///     threshold: QuarantineThreshold::from_minutes(60),
///     entries: Vec::new(),
///     plan: RemediationPlan::default(),
///     manifest_updated: false,
/// };
/// let json = format_json(&report).expect("report serializes");
/// assert!(json.contains("\"thresholdMinutes\": 60"));
/// ```
///
/// # Errors
///
/// Returns [`AuditError::Report`](crate::AuditError::Report) when the report cannot be serialized.
pub fn format_json(report: &AuditReport) -> Result<String> {
    let json_data = AuditReportJson::from_report(report);
    Ok(serde_json::to_string_pretty(&json_data)?)
}

/// JSON-serializable representation of an audit.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReportJson<'a> {
    /// Whether fixes were requested.
    pub fix: bool,
    /// Quarantine window in minutes.
    pub threshold_minutes: u64,
    /// Number of quarantined dependencies.
    pub quarantined: usize,
    /// Per-dependency results.
    pub dependencies: Vec<DependencyEntry<'a>>,
    /// Manifest edits.
    pub changes: &'a [PlannedChange],
    /// Whether the manifest was rewritten.
    pub manifest_updated: bool,
}

impl<'a> AuditReportJson<'a> {
    fn from_report(report: &'a AuditReport) -> Self {
        Self {
            fix: report.fix,
            threshold_minutes: report.threshold.minutes(),
            quarantined: report.quarantined_count(),
            dependencies: report.entries.iter().map(DependencyEntry::from_entry).collect(),
            changes: report.plan.as_slice(),
            manifest_updated: report.manifest_updated,
        }
    }
}

/// JSON entry for one dependency.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEntry<'a> {
    /// Package name.
    pub name: &'a str,
    /// Specifier as written.
    pub range: &'a str,
    /// Manifest section.
    pub kind: DependencyKind,
    /// One of `safe`, `quarantined`, `unresolvable`, `fetch-failed` or
    /// `invalid-metadata`.
    pub status: &'static str,
    /// Version the range resolves to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<&'a str>,
    /// Greatest safe version, for quarantined dependencies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_safe_version: Option<&'a str>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'a str>,
    /// Chosen remedy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remedy: Option<&'a Remedy>,
}

impl<'a> DependencyEntry<'a> {
    fn from_entry(entry: &'a ReportEntry) -> Self {
        let dependency = &entry.audit.dependency;
        let mut json = Self {
            name: &dependency.name,
            range: &dependency.range,
            kind: dependency.kind,
            status: "safe",
            resolved: None,
            latest_safe_version: None,
            reason: None,
            remedy: entry.remedy.as_ref(),
        };
        match &entry.audit.finding {
            Finding::Safe { resolved } => json.resolved = Some(resolved),
            Finding::Quarantined {
                resolved,
                latest_safe,
            } => {
                json.status = "quarantined";
                json.resolved = Some(resolved);
                json.latest_safe_version = latest_safe.as_deref();
            }
            Finding::Unresolvable => json.status = "unresolvable",
            Finding::FetchFailed { reason } => {
                json.status = "fetch-failed";
                json.reason = Some(reason);
            }
            Finding::InvalidMetadata { reason } => {
                json.status = "invalid-metadata";
                json.reason = Some(reason);
            }
        }
        json
    }
}
