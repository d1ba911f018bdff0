use crate::types::ProjectId;
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default environment level used by the gateway when none is given.
pub const DEFAULT_LEVEL: u32 = 1;

/// Which environment is being packaged, and for which project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentIdentity {
    pub project_id: ProjectId,
    pub environment_name: String,
    pub python_version: Option<PythonVersion>,
}

impl EnvironmentIdentity {
    pub fn new(project_id: impl Into<ProjectId>, environment_name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            environment_name: environment_name.into(),
            python_version: None,
        }
    }

    #[must_use]
    pub fn with_python(mut self, version: PythonVersion) -> Self {
        self.python_version = Some(version);
        self
    }

    /// Check the fields every pipeline run needs.
    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_env_name(&self.environment_name)?;
        if self.project_id.trim().is_empty() {
            return Err(SchemaError::Validation(format!(
                "no project id for environment '{}'",
                self.environment_name
            )));
        }
        Ok(())
    }

    /// Stricter check for registering an environment: the Python version must
    /// be known and be a Python 3 release.
    pub fn validate_for_submit(&self) -> Result<&PythonVersion, SchemaError> {
        self.validate()?;
        let Some(version) = &self.python_version else {
            return Err(SchemaError::Validation(format!(
                "python version of environment '{}' is unknown",
                self.environment_name
            )));
        };
        if version.major != 3 {
            return Err(SchemaError::Validation(format!(
                "environment '{}' uses python {version}, only python 3 is supported",
                self.environment_name
            )));
        }
        Ok(version)
    }

    /// Name of the packaged archive in the remote namespace,
    /// e.g. `pri_42_analytics.tar.gz`.
    pub fn artifact_name(&self) -> String {
        format!(
            "pri_{}_{}.tar.gz",
            self.project_id,
            self.environment_name.trim()
        )
    }
}

/// An environment name becomes a path component locally and on HDFS, and an
/// argument to `conda -n`. It must be non-empty, must not contain path
/// separators or `..`, and must not start with `-`.
pub fn validate_env_name(name: &str) -> Result<(), SchemaError> {
    if name.trim().is_empty() {
        return Err(SchemaError::Validation(
            "environment name must not be empty".to_owned(),
        ));
    }
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(SchemaError::Validation(format!(
            "environment name '{name}' must not contain '/', '\\' or '..'"
        )));
    }
    if name.starts_with('-') {
        return Err(SchemaError::Validation(format!(
            "environment name '{name}' must not start with '-'"
        )));
    }
    Ok(())
}

/// `major.minor.micro` Python version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

impl FromStr for PythonVersion {
    type Err = SchemaError;

    /// Accepts `3`, `3.8`, or `3.8.19`; missing parts are zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchemaError::Validation(format!("invalid python version: '{s}'"));
        let mut parts = s.trim().split('.');
        let mut next = |required: bool| -> Result<u32, SchemaError> {
            match parts.next() {
                Some(p) => p.parse().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };
        let version = Self {
            major: next(true)?,
            minor: next(false)?,
            micro: next(false)?,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

/// Per-invocation session values supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub project_id: ProjectId,
    pub created_by: String,
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_level() -> u32 {
    DEFAULT_LEVEL
}

impl SessionContext {
    pub fn new(project_id: impl Into<ProjectId>) -> Self {
        Self {
            project_id: project_id.into(),
            created_by: resolve_created_by(),
            level: DEFAULT_LEVEL,
        }
    }

    #[must_use]
    pub fn with_created_by(mut self, user: &str) -> Self {
        self.created_by = user.to_owned();
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn identity(&self, environment_name: &str) -> EnvironmentIdentity {
        EnvironmentIdentity::new(self.project_id.clone(), environment_name)
    }
}

/// Who to record as the creator of a registered environment: `DSP_USER`,
/// then `USER`, then `"unknown"`.
pub fn resolve_created_by() -> String {
    created_by_from(
        std::env::var("DSP_USER").ok().as_deref(),
        std::env::var("USER").ok().as_deref(),
    )
}

fn created_by_from(dsp_user: Option<&str>, user: Option<&str>) -> String {
    [dsp_user, user]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|u| !u.is_empty())
        .unwrap_or("unknown")
        .to_owned()
}
