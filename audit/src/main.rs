//! npm quarantine audit CLI entrypoint.
//!
//! This binary audits the dependencies declared in `package.json` against
//! the quarantine window and, with `--fix`, pins quarantined ones to their
//! newest safe version.

use chrono::Utc;
use clap::Parser;
use npm_quarantine_audit::cli::Cli;
use npm_quarantine_audit::error::Result;
use npm_quarantine_audit::install::NodeModulesProbe;
use npm_quarantine_audit::registry::HttpRegistry;
use npm_quarantine_audit::report::{format_human, format_json};
use npm_quarantine_audit::{AuditOptions, run_audit};
use npm_quarantine_common::{QuarantinePolicy, QuarantineThreshold};
use std::io::Write;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() {
    let cli = Cli::parse();
    init_logging();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stdout);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Routes `log` records to stderr, at `warn` unless `RUST_LOG` says otherwise.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .init();
}

fn run(cli: &Cli, stdout: &mut dyn Write) -> Result<()> {
    let config = cli.resolve_config()?;
    let policy = config
        .active_policy()
        .unwrap_or_else(|| QuarantinePolicy::new(QuarantineThreshold::DISABLED, config.no_safe));
    let dir = cli.project_dir().to_owned();

    let options = AuditOptions {
        dir: dir.clone(),
        fix: cli.fix,
        prefix: config.audit.prefix,
        policy,
        concurrency: config.audit.concurrency,
        now: Utc::now(),
    };
    let registry = HttpRegistry::new(config.upstream, config.audit.timeout);
    let probe = NodeModulesProbe::new(dir);

    let report = run_audit(&options, &registry, &probe)?;
    let output = if cli.json {
        format_json(&report)?
    } else {
        format_human(&report, cli.quiet)
    };
    write_line(stdout, output.trim_end());
    Ok(())
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_line(stderr, format!("❌ {err}"));
            1
        }
    }
}

fn write_line(stream: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stream, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use npm_quarantine_audit::AuditError;

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_error_and_returns_one() {
        let err = AuditError::ManifestShape {
            path: Utf8PathBuf::from("package.json"),
            reason: "the top level is not a JSON object".to_owned(),
        };

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.contains("package.json is not a package manifest"));
    }

    #[test]
    fn serialization_failures_exit_with_one() {
        let Err(source) = serde_json::from_str::<serde_json::Value>("{") else {
            panic!("truncated JSON must not parse");
        };

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(AuditError::from(source)), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.contains("failed to serialize the audit report"));
    }

    #[test]
    fn run_prints_a_json_report() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("package.json"), "{}").expect("write manifest");
        let cli = Cli {
            dir: Some(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("UTF-8 path")),
            json: true,
            ..Cli::default()
        };

        let mut stdout = Vec::new();
        run(&cli, &mut stdout).expect("audit runs");

        let json: serde_json::Value = serde_json::from_slice(&stdout).expect("valid JSON");
        assert_eq!(json["quarantined"], 0);
        assert!(json["dependencies"].as_array().is_some_and(Vec::is_empty));
    }

    #[test]
    fn run_reports_a_missing_manifest() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let cli = Cli {
            dir: Some(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("UTF-8 path")),
            ..Cli::default()
        };

        let mut stdout = Vec::new();
        let result = run(&cli, &mut stdout);

        assert!(matches!(result, Err(AuditError::ManifestRead { .. })));
        assert!(stdout.is_empty());
    }

    #[test]
    fn run_prints_the_empty_manifest_notice() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("package.json"), "{}").expect("write manifest");
        let cli = Cli {
            dir: Some(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("UTF-8 path")),
            ..Cli::default()
        };

        let mut stdout = Vec::new();
        run(&cli, &mut stdout).expect("audit runs");

        let text = String::from_utf8(stdout).expect("stdout was not UTF-8");
        assert!(text.contains("No dependencies found to audit."));
    }
}
