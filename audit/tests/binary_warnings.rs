//! Runs the audit binary and checks that corrected settings are reported on
//! stderr.

use rstest::rstest;
use std::process::Command;
use tempfile::TempDir;

fn empty_project() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("package.json"), "{}").expect("write manifest");
    dir
}

#[rstest]
#[case::negative_minutes(
    &["--minutes", "-5"],
    "quarantine minutes (-5) is invalid and has been corrected to 0"
)]
#[case::zero_concurrency(
    &["--concurrency", "0"],
    "audit concurrency 0 is invalid and has been corrected to 1"
)]
#[case::mirror_upstream(
    &["--upstream", "https://mirror.test"],
    "non-official-upstream upstream=https://mirror.test"
)]
fn corrected_settings_are_warned_about_on_stderr(#[case] args: &[&str], #[case] expected: &str) {
    let project = empty_project();

    let output = Command::new(env!("CARGO_BIN_EXE_npm-quarantine-audit"))
        .arg("--dir")
        .arg(project.path())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run npm-quarantine-audit");

    assert!(output.status.success(), "audit failed: {output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("WARN"), "missing level in {stderr:?}");
    assert!(stderr.contains(expected), "missing warning in {stderr:?}");
}

#[rstest]
fn valid_settings_stay_quiet() {
    let project = empty_project();

    let output = Command::new(env!("CARGO_BIN_EXE_npm-quarantine-audit"))
        .arg("--dir")
        .arg(project.path())
        .args(["--minutes", "60"])
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run npm-quarantine-audit");

    assert!(output.status.success(), "audit failed: {output:?}");
    assert!(output.stderr.is_empty(), "unexpected stderr: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No dependencies found to audit."));
}
