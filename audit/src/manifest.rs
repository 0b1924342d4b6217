//! Reading and rewriting `package.json`.
//!
//! The manifest is parsed once to learn which dependencies to audit. Fixes
//! are applied to the original text with targeted replacements, so
//! formatting, key order and unrelated entries survive byte for byte.

use crate::error::{AuditError, Result};
use crate::remediation::RemediationPlan;
use camino::{Utf8Path, Utf8PathBuf};
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;

/// File name of the manifest inside a project directory.
pub const MANIFEST_FILE: &str = "package.json";

/// Manifest section a dependency is declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DependencyKind {
    /// The `dependencies` section.
    #[serde(rename = "dependencies")]
    Dependencies,
    /// The `devDependencies` section.
    #[serde(rename = "devDependencies")]
    DevDependencies,
}

impl DependencyKind {
    /// The manifest key of the section.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dependencies => "dependencies",
            Self::DevDependencies => "devDependencies",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    /// Package name.
    pub name: String,
    /// Specifier text as written in the manifest.
    pub range: String,
    /// Section the dependency was taken from.
    pub kind: DependencyKind,
}

impl DependencySpec {
    /// Builds a dependency entry.
    #[must_use]
    pub fn new(name: impl Into<String>, range: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            name: name.into(),
            range: range.into(),
            kind,
        }
    }
}

/// A loaded `package.json`.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: Utf8PathBuf,
    text: String,
    dependencies: Vec<DependencySpec>,
}

impl Manifest {
    /// Reads `package.json` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ManifestRead`] when the file cannot be read and
    /// the errors of [`Self::parse`] otherwise.
    pub fn load(dir: &Utf8Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path).map_err(|source| AuditError::ManifestRead {
            path: path.clone(),
            source,
        })?;
        Self::parse(path, text)
    }

    /// Interprets manifest text read from `path`.
    ///
    /// `dependencies` are collected before `devDependencies`, each in
    /// document order. A name declared in both sections is kept once, as an
    /// ordinary dependency. Specifiers that are not strings are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ManifestParse`] for invalid JSON and
    /// [`AuditError::ManifestShape`] when the document is not an object.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8PathBuf;
    /// use npm_quarantine_audit::manifest::{DependencyKind, Manifest};
    ///
    /// let text = r#"{"dependencies": {"a": "^1.0.0"}, "devDependencies": {"a": "2", "b": "~3.1"}}"#;
    /// let manifest = Manifest::parse(Utf8PathBuf::from("package.json"), text.to_owned())
    ///     .expect("valid manifest");
    /// let names: Vec<_> = manifest.dependencies().iter().map(|dep| dep.name.as_str()).collect();
    /// assert_eq!(names, ["a", "b"]);
    /// assert_eq!(manifest.dependencies()[0].kind, DependencyKind::Dependencies);
    /// ```
    pub fn parse(path: Utf8PathBuf, text: String) -> Result<Self> {
        let document: Value =
            serde_json::from_str(&text).map_err(|source| AuditError::ManifestParse {
                path: path.clone(),
                source,
            })?;
        let Value::Object(root) = document else {
            return Err(AuditError::ManifestShape {
                path,
                reason: "the top level is not a JSON object".to_owned(),
            });
        };

        let mut seen = HashSet::new();
        let mut dependencies = Vec::new();
        for kind in [DependencyKind::Dependencies, DependencyKind::DevDependencies] {
            let Some(Value::Object(section)) = root.get(kind.as_str()) else {
                continue;
            };
            for (name, spec) in section {
                let Some(range) = spec.as_str() else {
                    log::debug!("ignoring non-string specifier for {name} in {kind}");
                    continue;
                };
                if seen.insert(name.clone()) {
                    dependencies.push(DependencySpec::new(name.clone(), range, kind));
                }
            }
        }

        Ok(Self {
            path,
            text,
            dependencies,
        })
    }

    /// Path the manifest was read from.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The manifest text as read.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Dependencies to audit, in manifest order.
    #[must_use]
    pub fn dependencies(&self) -> &[DependencySpec] {
        &self.dependencies
    }

    /// Writes the planned changes back to disk.
    ///
    /// Nothing is written when no planned entry changes the text. Returns
    /// whether the file was written.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ManifestWrite`] when the file cannot be written.
    pub fn apply(&self, plan: &RemediationPlan) -> Result<bool> {
        if plan.is_empty() {
            return Ok(false);
        }
        let updated = rewrite_manifest_text(&self.text, plan)?;
        if updated == self.text {
            return Ok(false);
        }
        std::fs::write(&self.path, updated).map_err(|source| AuditError::ManifestWrite {
            path: self.path.clone(),
            source,
        })?;
        Ok(true)
    }
}

/// Replaces the specifier of every planned dependency in manifest text.
///
/// Each change rewrites the first `"name": "current"` pair inside the
/// top-level section named by its kind. Entries whose section or pair no
/// longer appears in the text are left alone.
///
/// # Errors
///
/// Returns [`AuditError::Pattern`] when a search pattern cannot be compiled.
///
/// # Examples
///
/// ```
/// use npm_quarantine_audit::manifest::{DependencyKind, rewrite_manifest_text};
/// use npm_quarantine_audit::remediation::{PlannedChange, RemediationPlan};
///
/// let mut plan = RemediationPlan::default();
/// plan.push(PlannedChange::new("left-pad", "^1.0.0", "1.0.0", DependencyKind::Dependencies));
///
/// let text = "{\n  \"dependencies\": {\n    \"left-pad\":   \"^1.0.0\"\n  }\n}\n";
/// let updated = rewrite_manifest_text(text, &plan).expect("pattern compiles");
/// assert!(updated.contains("\"left-pad\":   \"1.0.0\""));
/// ```
pub fn rewrite_manifest_text(text: &str, plan: &RemediationPlan) -> Result<String> {
    let mut updated = text.to_owned();
    for change in plan.iter() {
        let pattern = entry_pattern(&change.name, &change.current).map_err(|source| {
            AuditError::Pattern {
                name: change.name.clone(),
                source,
            }
        })?;
        let Some(span) = section_span(&updated, change.kind.as_str()) else {
            log::debug!(
                "manifest section {} not found; leaving {} unchanged",
                change.kind,
                change.name
            );
            continue;
        };
        let Some(section) = updated.get(span.clone()) else {
            continue;
        };
        if !pattern.is_match(section) {
            log::debug!(
                "manifest entry {}: {:?} not found in {}; leaving it unchanged",
                change.name,
                change.current,
                change.kind
            );
            continue;
        }
        let replaced = pattern
            .replacen(section, 1, |caps: &Captures<'_>| {
                format!("{}\"{}\"", &caps[1], change.target)
            })
            .into_owned();
        updated.replace_range(span, &replaced);
    }
    Ok(updated)
}

fn entry_pattern(name: &str, current: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!(
        r#"("{}"\s*:\s*)"{}""#,
        regex::escape(name),
        regex::escape(current)
    ))
}

/// Byte range between the braces of the top-level object stored under `key`.
fn section_span(text: &str, key: &str) -> Option<Range<usize>> {
    let bytes = text.as_bytes();
    let mut depth = 0_usize;
    let mut index = 0;
    while let Some(&byte) = bytes.get(index) {
        match byte {
            b'"' => {
                let end = string_end(bytes, index)?;
                if depth == 1 && text.get(index + 1..end) == Some(key) {
                    let colon = skip_whitespace(bytes, end + 1);
                    if bytes.get(colon) == Some(&b':') {
                        let open = skip_whitespace(bytes, colon + 1);
                        if bytes.get(open) == Some(&b'{') {
                            let close = matching_close(bytes, open)?;
                            return Some(open + 1..close);
                        }
                    }
                }
                index = end;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        index += 1;
    }
    None
}

/// Index of the quote closing the string that opens at `start`.
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut index = start + 1;
    while let Some(&byte) = bytes.get(index) {
        match byte {
            b'\\' => index += 2,
            b'"' => return Some(index),
            _ => index += 1,
        }
    }
    None
}

fn skip_whitespace(bytes: &[u8], mut index: usize) -> usize {
    while bytes.get(index).is_some_and(u8::is_ascii_whitespace) {
        index += 1;
    }
    index
}

fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0_usize;
    let mut index = open;
    while let Some(&byte) = bytes.get(index) {
        match byte {
            b'"' => index = string_end(bytes, index)?,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
        index += 1;
    }
    None
}
