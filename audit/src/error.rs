//! Error types for the quarantine audit.
//!
//! Per-dependency problems (a failed fetch, a range nothing satisfies) are
//! reported as findings and never abort the audit. The variants here cover
//! the failures that stop the whole run.

use camino::Utf8PathBuf;
use npm_quarantine::ConfigError;
use thiserror::Error;

/// Errors that abort an audit run.
#[derive(Debug, Error)]
pub enum AuditError {
    /// `package.json` could not be read.
    #[error("failed to read {path}: {source}")]
    ManifestRead {
        /// Path of the manifest.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// `package.json` is not valid JSON.
    #[error("failed to parse {path}: {source}")]
    ManifestParse {
        /// Path of the manifest.
        path: Utf8PathBuf,
        /// Parser failure.
        #[source]
        source: serde_json::Error,
    },

    /// `package.json` parsed but is not a JSON object.
    #[error("{path} is not a package manifest: {reason}")]
    ManifestShape {
        /// Path of the manifest.
        path: Utf8PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The rewritten manifest could not be written back.
    #[error("failed to write {path}: {source}")]
    ManifestWrite {
        /// Path of the manifest.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The search pattern for a manifest entry could not be compiled.
    #[error("failed to build the rewrite pattern for {name}: {source}")]
    Pattern {
        /// Dependency whose entry was being rewritten.
        name: String,
        /// Regex compilation failure.
        #[source]
        source: regex::Error,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The fetch worker pool could not be started.
    #[error("failed to start the fetch worker pool: {reason}")]
    WorkerPool {
        /// Description of the failure.
        reason: String,
    },

    /// The report could not be serialized.
    #[error("failed to serialize the audit report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Result type for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;
