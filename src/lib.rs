//! Quarantine window for npm registry metadata: configuration loading,
//! upstream addressing and the serving-side decisions a registry proxy makes.

pub mod config;
pub mod serve;
pub mod upstream;

pub use config::{AuditSettings, ConfigError, QuarantineConfig};
pub use serve::{MetadataResponse, QuarantineDenial, ServeSettings, VersionResponse};
pub use upstream::{UpstreamBase, UpstreamError};
