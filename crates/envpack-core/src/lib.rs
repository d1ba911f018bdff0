//! Packaging pipeline for envpack.
//!
//! This crate ties together manifest normalization, the gateway client, and
//! the subprocess backends into the `Pipeline`: the central API for packaging
//! an environment (with artifact reuse), submitting it as a named environment,
//! and downloading a registered one. It also provides the per-attempt
//! `PackagingJob`, the pipeline state machine, layered configuration, and
//! Ctrl-C handling.

pub mod archive;
pub mod concurrency;
pub mod config;
pub mod job;
pub mod lifecycle;
pub mod pipeline;
pub mod transfer;

pub use archive::ArchiveBuilder;
pub use concurrency::{install_signal_handler, shutdown_requested};
pub use config::{default_config_path, EnvpackConfig, RunEnv, StorageLayout};
pub use job::{LocalArchive, PackagingJob};
pub use lifecycle::{validate_transition, PipelineState};
pub use pipeline::{
    DownloadOutcome, PackageOutcome, Pipeline, PipelineSettings, SubmitOutcome,
};
pub use transfer::{ArtifactTransfer, CleanupReport};

use envpack_remote::RemoteError;
use envpack_runtime::RuntimeError;
use envpack_schema::SchemaError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Pipeline step an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Export,
    NameCheck,
    Archive,
    Staging,
    Adopt,
    Register,
    Resolve,
    Fetch,
    Unpack,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validate => "validation",
            Self::Export => "manifest export",
            Self::NameCheck => "name check",
            Self::Archive => "archive",
            Self::Staging => "staging",
            Self::Adopt => "package adoption",
            Self::Register => "registration",
            Self::Resolve => "metadata lookup",
            Self::Fetch => "fetch",
            Self::Unpack => "unpack",
        };
        f.write_str(s)
    }
}

/// Coarse failure class, stable across the wrapped error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    RemoteLogic,
    Subprocess,
    Timeout,
    Validation,
    Cancelled,
    Io,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("{0}")]
    Validation(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(String),
    #[error("environment '{env}' failed during {stage}: {source}")]
    Stage {
        env: String,
        stage: Stage,
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(SchemaError::Validation(_))
            | Self::InvalidTransition { .. }
            | Self::Validation(_)
            | Self::Config(_)
            | Self::Runtime(RuntimeError::BackendUnavailable(_))
            | Self::Remote(RemoteError::Config(_)) => ErrorKind::Validation,
            Self::Schema(SchemaError::Io(_))
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Task(_)
            | Self::Runtime(RuntimeError::Io(_)) => ErrorKind::Io,
            Self::Runtime(
                RuntimeError::Spawn { .. } | RuntimeError::Subprocess { .. } | RuntimeError::Output(_),
            ) => ErrorKind::Subprocess,
            Self::Runtime(RuntimeError::Timeout { .. }) => ErrorKind::Timeout,
            Self::Runtime(RuntimeError::Cancelled(_)) => ErrorKind::Cancelled,
            Self::Remote(RemoteError::Logic(_)) => ErrorKind::RemoteLogic,
            Self::Remote(
                RemoteError::Io(_)
                | RemoteError::Transport(_)
                | RemoteError::NotFound(_)
                | RemoteError::Serialization(_),
            ) => ErrorKind::Transport,
            Self::Stage { source, .. } => source.kind(),
        }
    }

    /// Stage the error was raised in, if it was attributed to one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Wrap `err` with the environment name and failing stage. Errors that are
/// already attributed keep their original stage.
pub(crate) fn stage_error(env: &str, stage: Stage, err: impl Into<CoreError>) -> CoreError {
    let source: CoreError = err.into();
    if matches!(source, CoreError::Stage { .. }) {
        return source;
    }
    CoreError::Stage {
        env: env.to_owned(),
        stage,
        source: Box::new(source),
    }
}

pub(crate) trait StageContext<T> {
    fn at_stage(self, env: &str, stage: Stage) -> Result<T, CoreError>;
}

impl<T, E: Into<CoreError>> StageContext<T> for Result<T, E> {
    fn at_stage(self, env: &str, stage: Stage) -> Result<T, CoreError> {
        self.map_err(|e| stage_error(env, stage, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_names_env_and_stage() {
        let r: Result<(), RuntimeError> = Err(RuntimeError::Subprocess {
            program: "conda-pack".to_owned(),
            code: Some(1),
            tail: vec!["boom".to_owned()],
        });
        let err = r.at_stage("analytics", Stage::Archive).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'analytics'"));
        assert!(msg.contains("during archive"));
        assert_eq!(err.kind(), ErrorKind::Subprocess);
        assert_eq!(err.stage(), Some(Stage::Archive));
    }

    #[test]
    fn stage_context_does_not_double_wrap() {
        let inner: Result<(), CoreError> = Err(CoreError::Validation("bad".to_owned()));
        let once = inner.at_stage("a", Stage::Validate);
        let twice = once.at_stage("a", Stage::Export).unwrap_err();
        assert_eq!(twice.stage(), Some(Stage::Validate));
    }

    #[test]
    fn kinds_follow_the_wrapped_error() {
        assert_eq!(
            CoreError::from(RemoteError::Logic("duplicate name".to_owned())).kind(),
            ErrorKind::RemoteLogic
        );
        assert_eq!(
            CoreError::from(RemoteError::Transport("HTTP 502".to_owned())).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            CoreError::from(RuntimeError::Timeout {
                program: "hdfs".to_owned(),
                secs: 600
            })
            .kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            CoreError::from(RuntimeError::Cancelled("conda-pack".to_owned())).kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(
            CoreError::from(SchemaError::Validation("x".to_owned())).kind(),
            ErrorKind::Validation
        );
    }
}
