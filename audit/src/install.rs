//! Inspection of what is already installed next to the manifest.
//!
//! A quarantined range can be left alone when the lockfile already pins the
//! installed copy to the safe version; the probe answers both halves of that
//! question.

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;

/// Name of the npm lockfile.
pub const LOCKFILE: &str = "package-lock.json";

/// Answers questions about the local install.
#[cfg_attr(test, mockall::automock)]
pub trait InstallProbe {
    /// Version of `package` currently installed, if any.
    fn installed_version(&self, package: &str) -> Option<String>;

    /// Whether a lockfile sits next to the manifest.
    fn has_lockfile(&self) -> bool;
}

/// Reads `node_modules/<name>/package.json` and looks for `package-lock.json`.
#[derive(Debug, Clone)]
pub struct NodeModulesProbe {
    root: Utf8PathBuf,
}

impl NodeModulesProbe {
    /// Probes the project rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The project directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl InstallProbe for NodeModulesProbe {
    fn installed_version(&self, package: &str) -> Option<String> {
        let path = self
            .root
            .join("node_modules")
            .join(package)
            .join("package.json");
        // Unreadable or malformed installs count as absent.
        let text = std::fs::read_to_string(&path).ok()?;
        let document: Value = serde_json::from_str(&text).ok()?;
        document
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    fn has_lockfile(&self) -> bool {
        self.root.join(LOCKFILE).is_file()
    }
}
