//! Quarantine policy engine for npm registry metadata: version and range
//! handling, safe-version classification, dist-tag rewriting and
//! per-version lookups.

pub mod classify;
pub mod lookup;
pub mod metadata;
pub mod policy;
pub mod range;
pub mod rewrite;
pub mod threshold;
pub mod version;

pub use classify::{SafeVersions, VersionStatus, classify, version_status};
pub use lookup::{VersionLookup, lookup};
pub use metadata::{
    DistTags, LATEST_TAG, MetadataError, PackageMetadata, PublishTimes, QUARANTINE_LATEST_TAG,
    VersionsCatalog,
};
pub use policy::{PolicyOutcome, QuarantinePolicy};
pub use range::{Range, RangeError, max_satisfying};
pub use rewrite::{
    InvalidNoSafePolicy, NoSafePolicy, QuarantineBlocked, RewriteContext, RewriteReport, rewrite,
};
pub use threshold::{DEFAULT_THRESHOLD_MINUTES, QuarantineThreshold};
pub use version::{compare_precedence, greatest_version, is_valid_version, parse_version};
