//! Manifest capture, dependency normalization, and identity types for envpack.
//!
//! This crate defines the schema layer: raw environment exports
//! (`EnvironmentManifest`), the order-independent dependency fingerprint used
//! for artifact reuse (`NormalizedFingerprint`), the environment/session
//! identity passed into every pipeline run, and string newtypes.

pub mod identity;
pub mod manifest;
pub mod normalize;
pub mod types;

pub use identity::{
    resolve_created_by, validate_env_name, EnvironmentIdentity, PythonVersion, SessionContext,
    DEFAULT_LEVEL,
};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, DependencyRegion, EnvironmentManifest, MarkerStatus,
};
pub use normalize::{normalize, NormalizedFingerprint};
pub use types::{Fingerprint, JobId, ProjectId};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("validation error: {0}")]
    Validation(String),
}
