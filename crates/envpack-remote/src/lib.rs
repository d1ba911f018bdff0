//! Gateway client for envpack.
//!
//! The gateway owns the remote artifact namespace and the fingerprint index.
//! This crate provides its configuration, the JSON wire types, the
//! `GatewayApi` seam with an HTTP implementation and an in-memory mock, and the
//! two policies layered on top of it: the fail-open `ReuseResolver` and the
//! strict `RegistrationClient`.

pub mod config;
pub mod http;
pub mod mock;
pub mod registration;
pub mod reuse;
pub mod wire;

pub use config::GatewayConfig;
pub use http::HttpGateway;
pub use mock::{GatewayCall, MockGateway};
pub use registration::RegistrationClient;
pub use reuse::ReuseResolver;
pub use wire::{
    EnvMeta, NameCheck, RegisterEnvironment, RegisterResponse, RegistrationResult,
    RegistrationStatus, ReuseCheckRequest, ReuseDecision, UploadPackageRequest,
};

use envpack_schema::ProjectId;
use thiserror::Error;

/// Protocol version sent as `X-Envpack-Protocol` on every request.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("gateway I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The gateway could not be reached or answered with a non-2xx status.
    #[error("gateway transport error: {0}")]
    Transport(String),
    /// The gateway answered 2xx but reported a failure in the body.
    #[error("gateway rejected request: {0}")]
    Logic(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("gateway config error: {0}")]
    Config(String),
}

/// Operations offered by the gateway.
///
/// Implementations are blocking; async callers run them on a blocking thread.
pub trait GatewayApi: Send + Sync {
    /// Resolve an environment name to its canonical storage location.
    fn env_meta(&self, project: &ProjectId, name: &str, level: u32)
        -> Result<EnvMeta, RemoteError>;

    /// Ask whether an artifact for this manifest's dependency set exists.
    fn reusable_check(&self, request: &ReuseCheckRequest) -> Result<ReuseDecision, RemoteError>;

    /// Record a packaged environment under a name.
    fn register_environment(
        &self,
        request: &RegisterEnvironment,
    ) -> Result<RegisterResponse, RemoteError>;

    /// Adopt a staged package at its canonical path.
    fn upload_package(
        &self,
        request: &UploadPackageRequest,
    ) -> Result<RegistrationResult, RemoteError>;

    /// Name-collision check. Returns the raw answer: empty when the name is
    /// free, otherwise the conflicting name.
    fn check_name(
        &self,
        project: &ProjectId,
        name: &str,
        manifest_text: &str,
    ) -> Result<String, RemoteError>;
}
