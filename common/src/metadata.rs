//! Typed view of an npm package metadata document.
//!
//! Only the three fields the quarantine engine reasons about are typed:
//! `dist-tags`, `time` and `versions`. Every other field is carried through
//! untouched so that a rewritten document serializes back to what the
//! registry sent, minus the quarantined entries.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dist-tag that always points at the newest stable release.
pub const LATEST_TAG: &str = "latest";

/// Dist-tag that preserves the pre-rewrite `latest` when it was quarantined.
pub const QUARANTINE_LATEST_TAG: &str = "quarantine-latest";

/// Keys of the `time` map that are document timestamps, not versions.
pub const TIME_SENTINEL_KEYS: &[&str] = &["created", "modified"];

/// Errors raised when a JSON value is not usable as package metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The value is not an object, or a typed field has the wrong shape.
    #[error("not package metadata: {reason}")]
    NotPackageMetadata {
        /// Description of the shape mismatch.
        reason: String,
        /// The rejected document, handed back so it can be passed through.
        document: Value,
    },
}

impl MetadataError {
    /// Recovers the document that failed to parse.
    #[must_use]
    pub fn into_document(self) -> Value {
        match self {
            Self::NotPackageMetadata { document, .. } => document,
        }
    }
}

/// An npm package metadata document (a "packument").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Named pointers to versions.
    #[serde(rename = "dist-tags", default, skip_serializing_if = "Option::is_none")]
    pub dist_tags: Option<DistTags>,
    /// Publish timestamps keyed by version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<PublishTimes>,
    /// Release descriptors keyed by version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<VersionsCatalog>,
    /// Every other top-level field, preserved verbatim.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl PackageMetadata {
    /// Interprets a JSON value as package metadata.
    ///
    /// The value must be an object; `dist-tags`, `time` and `versions` may be
    /// absent but must be objects when present.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::NotPackageMetadata`] when the shape does not
    /// match.
    ///
    /// # Examples
    ///
    /// ```
    /// use npm_quarantine_common::metadata::PackageMetadata;
    /// use serde_json::json;
    ///
    /// let doc = json!({"name": "left-pad", "dist-tags": {"latest": "1.3.0"}});
    /// let meta = PackageMetadata::from_value(doc).expect("valid metadata");
    /// assert_eq!(meta.latest(), Some("1.3.0"));
    ///
    /// assert!(PackageMetadata::from_value(json!({"time": "yesterday"})).is_err());
    /// ```
    pub fn from_value(value: Value) -> Result<Self, MetadataError> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(MetadataError::NotPackageMetadata {
                    reason: "document is not a JSON object".to_owned(),
                    document: other,
                });
            }
        };
        if let Some(field) = ["dist-tags", "time", "versions"]
            .into_iter()
            .find(|field| object.get(*field).is_some_and(|typed| !typed.is_object()))
        {
            return Err(MetadataError::NotPackageMetadata {
                reason: format!("`{field}` is not an object"),
                document: Value::Object(object),
            });
        }

        Ok(Self {
            dist_tags: take_object(&mut object, "dist-tags").map(DistTags),
            time: take_object(&mut object, "time").map(PublishTimes),
            versions: take_object(&mut object, "versions").map(VersionsCatalog),
            other: object,
        })
    }

    /// Serializes the document back into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        // Every field is a JSON map or value already, so serialization cannot
        // fail; fall back to an empty object rather than panic.
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Returns the current `latest` dist-tag, if it is a string.
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.as_ref()?.get(LATEST_TAG)
    }

    /// Returns the `quarantine-latest` dist-tag, if present.
    #[must_use]
    pub fn quarantine_latest(&self) -> Option<&str> {
        self.dist_tags.as_ref()?.get(QUARANTINE_LATEST_TAG)
    }

    /// Returns the keys of the `versions` catalog, unfiltered.
    #[must_use]
    pub fn version_keys(&self) -> Vec<&str> {
        self.versions
            .as_ref()
            .map(|catalog| catalog.keys().collect())
            .unwrap_or_default()
    }
}

/// Mapping from tag name to version.
///
/// Values that are not strings are kept but never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistTags(Map<String, Value>);

impl DistTags {
    /// Returns the version a tag points at.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.0.get(tag).and_then(Value::as_str)
    }

    /// Points `tag` at `version`.
    pub fn set(&mut self, tag: impl Into<String>, version: impl Into<String>) {
        self.0.insert(tag.into(), Value::String(version.into()));
    }

    /// Removes a tag, returning its previous raw value.
    pub fn remove(&mut self, tag: &str) -> Option<Value> {
        self.0.remove(tag)
    }

    /// Returns `true` when the tag is present, whatever its value.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains_key(tag)
    }

    /// Iterates over tags whose value is a string.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|(tag, value)| value.as_str().map(|version| (tag.as_str(), version)))
    }

    /// Returns the number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when there are no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DistTags {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(tag, version)| (tag.into(), Value::String(version.into())))
                .collect(),
        )
    }
}

/// Mapping from version to its publish timestamp (the `time` field).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishTimes(Map<String, Value>);

impl PublishTimes {
    /// Returns the raw timestamp string recorded for `key`.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns the parsed publish time of a version.
    ///
    /// Sentinel keys and unparseable timestamps yield `None`.
    #[must_use]
    pub fn published_at(&self, version: &str) -> Option<DateTime<Utc>> {
        if TIME_SENTINEL_KEYS.contains(&version) {
            return None;
        }
        self.raw(version).and_then(parse_timestamp)
    }

    /// Iterates over every entry that is not a sentinel key.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0
            .iter()
            .filter(|(key, _)| !TIME_SENTINEL_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Records a publish time.
    pub fn insert(&mut self, key: impl Into<String>, timestamp: impl Into<String>) {
        self.0.insert(key.into(), Value::String(timestamp.into()));
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PublishTimes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, timestamp)| (key.into(), Value::String(timestamp.into())))
                .collect(),
        )
    }
}

/// Mapping from version to its (opaque) release descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionsCatalog(Map<String, Value>);

impl VersionsCatalog {
    /// Iterates over the version keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns `true` when the catalog lists `version`.
    #[must_use]
    pub fn contains(&self, version: &str) -> bool {
        self.0.contains_key(version)
    }

    /// Keeps only the entries for which `keep` returns `true`, returning the
    /// removed keys.
    pub fn retain_versions<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let removed: Vec<String> = self
            .0
            .keys()
            .filter(|key| !keep(key.as_str()))
            .cloned()
            .collect();
        for key in &removed {
            self.0.remove(key);
        }
        removed
    }

    /// Adds a release descriptor.
    pub fn insert(&mut self, version: impl Into<String>, descriptor: Value) {
        self.0.insert(version.into(), descriptor);
    }

    /// Returns the number of listed versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no versions are listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn take_object(object: &mut Map<String, Value>, field: &str) -> Option<Map<String, Value>> {
    match object.remove(field) {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Parses a registry timestamp.
///
/// Accepts RFC 3339 (`2025-12-01T12:00:00.000Z`), a naive date-time taken as
/// UTC, and a bare date taken as midnight UTC.
///
/// # Examples
///
/// ```
/// use npm_quarantine_common::metadata::parse_timestamp;
///
/// assert!(parse_timestamp("2025-12-01T12:00:00.000Z").is_some());
/// assert!(parse_timestamp("2025-12-01").is_some());
/// assert!(parse_timestamp("invalid-iso").is_none());
/// ```
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let doc = json!({
            "name": "demo",
            "readme": "hello",
            "dist-tags": {"latest": "1.0.0"},
            "versions": {"1.0.0": {"dist": {"tarball": "https://example.test/demo.tgz"}}},
        });
        let meta = PackageMetadata::from_value(doc.clone()).expect("valid metadata");
        assert_eq!(meta.into_value(), doc);
    }

    #[rstest]
    #[case::array(json!([1, 2, 3]))]
    #[case::string_tags(json!({"dist-tags": "latest"}))]
    #[case::null_time(json!({"time": null, "dist-tags": {}}))]
    fn malformed_shapes_are_rejected(#[case] doc: Value) {
        assert!(PackageMetadata::from_value(doc).is_err());
    }

    #[test]
    fn rejected_documents_are_handed_back() {
        let doc = json!({"dist-tags": ["latest"], "name": "odd"});
        let error = PackageMetadata::from_value(doc.clone()).expect_err("array tags rejected");
        assert!(error.to_string().contains("`dist-tags` is not an object"));
        assert_eq!(error.into_document(), doc);
    }

    #[test]
    fn absent_fields_are_allowed() {
        let meta = PackageMetadata::from_value(json!({"name": "bare"})).expect("valid");
        assert!(meta.dist_tags.is_none());
        assert!(meta.time.is_none());
        assert!(meta.version_keys().is_empty());
    }

    #[test]
    fn non_string_tag_values_are_not_interpreted() {
        let meta =
            PackageMetadata::from_value(json!({"dist-tags": {"latest": 7, "next": "2.0.0"}}))
                .expect("valid");
        let tags = meta.dist_tags.expect("tags present");
        assert_eq!(tags.get("latest"), None);
        assert!(tags.contains("latest"));
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec![("next", "2.0.0")]);
    }

    #[test]
    fn sentinel_keys_have_no_publish_time() {
        let times: PublishTimes = [
            ("created", "2020-01-01T00:00:00.000Z"),
            ("1.0.0", "2020-01-02T00:00:00.000Z"),
        ]
        .into_iter()
        .collect();
        assert!(times.published_at("created").is_none());
        assert!(times.published_at("1.0.0").is_some());
        assert_eq!(times.entries().count(), 1);
    }

    #[rstest]
    #[case::rfc3339_millis("2025-12-01T12:00:00.000Z")]
    #[case::rfc3339_offset("2025-12-01T21:00:00+09:00")]
    #[case::naive("2025-12-01T12:00:00")]
    fn timestamps_resolve_to_the_same_instant(#[case] raw: &str) {
        let expected = parse_timestamp("2025-12-01T12:00:00Z").expect("valid");
        assert_eq!(parse_timestamp(raw), Some(expected));
    }
}
