//! Behaviour-driven coverage for the quarantine policy engine.
//!
//! Scenarios build a metadata document relative to a fixed clock, run it
//! through the engine and inspect the rewritten dist-tags.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use npm_quarantine_common::lookup::VersionLookup;
use npm_quarantine_common::metadata::{PackageMetadata, PublishTimes};
use npm_quarantine_common::policy::{PolicyOutcome, QuarantinePolicy};
use npm_quarantine_common::rewrite::NoSafePolicy;
use npm_quarantine_common::threshold::QuarantineThreshold;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Map, Value, json};

const NOW: &str = "2025-12-01T12:00:00Z";

#[derive(Default)]
struct QuarantineWorld {
    policy: QuarantinePolicy,
    published: Vec<(String, u64)>,
    tags: Vec<(String, String)>,
    outcome: Option<PolicyOutcome>,
    lookup: Option<VersionLookup>,
}

#[fixture]
fn world() -> QuarantineWorld {
    QuarantineWorld::default()
}

fn now() -> DateTime<Utc> {
    NOW.parse().expect("valid clock")
}

fn times(world: &QuarantineWorld) -> PublishTimes {
    world
        .published
        .iter()
        .map(|(version, age)| {
            let age = i64::try_from(*age).expect("age fits");
            let stamp =
                (now() - TimeDelta::minutes(age)).to_rfc3339_opts(SecondsFormat::Millis, true);
            (version.clone(), stamp)
        })
        .collect()
}

fn document(world: &QuarantineWorld) -> PackageMetadata {
    let tags: Map<String, Value> = world
        .tags
        .iter()
        .map(|(tag, version)| (tag.clone(), json!(version)))
        .collect();
    let versions: Map<String, Value> = world
        .published
        .iter()
        .map(|(version, _)| (version.clone(), json!({"version": version})))
        .collect();
    let raw = json!({
        "name": "scenario-package",
        "dist-tags": tags,
        "time": serde_json::to_value(times(world)).expect("times serialize"),
        "versions": versions,
    });
    PackageMetadata::from_value(raw).expect("valid metadata")
}

fn served(world: &QuarantineWorld) -> &PackageMetadata {
    match world.outcome.as_ref().expect("metadata rewritten") {
        PolicyOutcome::Served { metadata, .. } => metadata,
        PolicyOutcome::Blocked(blocked) => panic!("unexpected block: {blocked}"),
    }
}

#[given("a quarantine window of {minutes:u64} minutes")]
fn given_window(world: &mut QuarantineWorld, minutes: u64) {
    world.policy.threshold = QuarantineThreshold::from_minutes(minutes);
}

#[given("the no-safe policy is \"{policy}\"")]
fn given_policy(world: &mut QuarantineWorld, policy: String) {
    world.policy.no_safe = policy.parse().expect("known policy");
}

#[given("version \"{version}\" published {age:u64} minutes ago")]
fn given_version(world: &mut QuarantineWorld, version: String, age: u64) {
    world.published.push((version, age));
}

#[given("dist-tag \"{tag}\" targets \"{version}\"")]
fn given_tag(world: &mut QuarantineWorld, tag: String, version: String) {
    world.tags.push((tag, version));
}

#[when("the metadata is rewritten")]
fn when_rewritten(world: &mut QuarantineWorld) {
    let outcome = world.policy.apply(document(world), now());
    world.outcome = Some(outcome);
}

#[when("version \"{version}\" is looked up")]
fn when_looked_up(world: &mut QuarantineWorld, version: String) {
    let result = world.policy.lookup(&version, &times(world), now());
    world.lookup = Some(result);
}

#[then("tag \"{tag}\" is \"{version}\"")]
fn then_tag_is(world: &mut QuarantineWorld, tag: String, version: String) {
    let tags = served(world).dist_tags.as_ref().expect("dist-tags kept");
    assert_eq!(tags.get(&tag), Some(version.as_str()));
}

#[then("tag \"{tag}\" is absent")]
fn then_tag_absent(world: &mut QuarantineWorld, tag: String) {
    let tags = served(world).dist_tags.as_ref().expect("dist-tags kept");
    assert!(!tags.contains(&tag), "tag {tag} should be absent");
}

#[then("the versions catalog lists {count:usize} versions")]
fn then_catalog_len(world: &mut QuarantineWorld, count: usize) {
    let catalog = served(world).versions.as_ref().expect("catalog kept");
    assert_eq!(catalog.len(), count);
}

#[then("the document is blocked")]
fn then_blocked(world: &mut QuarantineWorld) {
    let outcome = world.outcome.as_ref().expect("metadata rewritten");
    assert!(outcome.is_blocked(), "expected a block, got {outcome:?}");
}

#[then("the version is not quarantined")]
fn then_not_quarantined(world: &mut QuarantineWorld) {
    let result = world.lookup.as_ref().expect("lookup ran");
    assert!(!result.quarantined);
}

#[then("the version is quarantined with safe alternative \"{version}\"")]
fn then_quarantined_with(world: &mut QuarantineWorld, version: String) {
    let result = world.lookup.as_ref().expect("lookup ran");
    assert!(result.quarantined);
    assert_eq!(result.latest_safe_version.as_deref(), Some(version.as_str()));
}

#[scenario(
    path = "tests/features/quarantine.feature",
    name = "A quarantined latest falls back to the newest safe version"
)]
fn scenario_latest_fallback(world: QuarantineWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/quarantine.feature",
    name = "The fail policy blocks when nothing is safe"
)]
fn scenario_fail_blocks(world: QuarantineWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/quarantine.feature",
    name = "The set-safe policy leaves latest absent when nothing is safe"
)]
fn scenario_set_safe_absent(world: QuarantineWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/quarantine.feature",
    name = "Semantic precedence beats publish recency"
)]
fn scenario_semver_precedence(world: QuarantineWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/quarantine.feature",
    name = "A version exactly at the threshold is not quarantined"
)]
fn scenario_threshold_equality(world: QuarantineWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/quarantine.feature",
    name = "A young version reports the newest safe alternative"
)]
fn scenario_lookup_alternative(world: QuarantineWorld) {
    let _ = world;
}
