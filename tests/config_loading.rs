//! Behaviour-driven tests for quarantine configuration loading.

use camino::{Utf8Path, Utf8PathBuf};
use npm_quarantine::{ConfigError, QuarantineConfig};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

#[derive(Default)]
struct ConfigWorld {
    temp_dir: Option<TempDir>,
    path: Option<Utf8PathBuf>,
    result: Option<Result<QuarantineConfig, ConfigError>>,
}

#[fixture]
fn world() -> ConfigWorld {
    ConfigWorld {
        temp_dir: Some(TempDir::new().expect("temp dir")),
        ..ConfigWorld::default()
    }
}

fn config_path(world: &ConfigWorld) -> Utf8PathBuf {
    let dir = world.temp_dir.as_ref().expect("temp dir set").path();
    Utf8Path::from_path(dir)
        .expect("temp dir is UTF-8")
        .join("quarantine.toml")
}

/// Feature files spell newlines as `\n` so each source fits on one line.
fn unescape(source: &str) -> String {
    source.replace("\\n", "\n")
}

fn loaded(world: &ConfigWorld) -> &QuarantineConfig {
    match world.result.as_ref().expect("configuration loaded") {
        Ok(config) => config,
        Err(error) => panic!("expected configuration loading to succeed: {error}"),
    }
}

#[given("an empty configuration file")]
fn given_empty_file(world: &mut ConfigWorld) {
    let path = config_path(world);
    std::fs::write(&path, "").expect("write config");
    world.path = Some(path);
}

#[given("a configuration file containing \"{source}\"")]
fn given_file(world: &mut ConfigWorld, source: String) {
    let path = config_path(world);
    std::fs::write(&path, unescape(&source)).expect("write config");
    world.path = Some(path);
}

#[given("no configuration file exists")]
fn given_no_file(world: &mut ConfigWorld) {
    world.path = Some(config_path(world));
}

#[when("the configuration is loaded")]
fn when_loaded(world: &mut ConfigWorld) {
    let path = world.path.clone().expect("path set");
    world.result = Some(QuarantineConfig::load_from(&path));
}

#[then("the quarantine window is {minutes:u64} minutes")]
fn then_window(world: &mut ConfigWorld, minutes: u64) {
    assert_eq!(loaded(world).threshold.minutes(), minutes);
}

#[then("the no-safe policy is \"{policy}\"")]
fn then_policy(world: &mut ConfigWorld, policy: String) {
    assert_eq!(loaded(world).no_safe.as_str(), policy);
}

#[then("the audit concurrency is {count:usize}")]
fn then_concurrency(world: &mut ConfigWorld, count: usize) {
    assert_eq!(loaded(world).audit.concurrency, count);
}

#[then("a configuration error mentioning \"{snippet}\" is reported")]
fn then_error(world: &mut ConfigWorld, snippet: String) {
    match world.result.as_ref().expect("configuration loaded") {
        Err(error) => {
            let message = error.to_string();
            assert!(
                message.contains(&snippet),
                "expected error '{message}' to mention '{snippet}'"
            );
        }
        Ok(config) => panic!("expected configuration loading to fail, got {config:?}"),
    }
}

#[scenario(
    path = "tests/features/config_loading.feature",
    name = "Defaults apply when the file is empty"
)]
fn scenario_defaults(world: ConfigWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/config_loading.feature",
    name = "Overrides are read from the file"
)]
fn scenario_overrides(world: ConfigWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/config_loading.feature",
    name = "A negative window is corrected to zero"
)]
fn scenario_negative_window(world: ConfigWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/config_loading.feature",
    name = "An unknown policy is rejected"
)]
fn scenario_unknown_policy(world: ConfigWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/config_loading.feature",
    name = "Unknown keys are rejected"
)]
fn scenario_unknown_keys(world: ConfigWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/config_loading.feature",
    name = "A missing file is reported with its path"
)]
fn scenario_missing_file(world: ConfigWorld) {
    let _ = world;
}
