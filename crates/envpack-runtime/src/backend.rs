use crate::{RunControl, RuntimeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Sink for human-readable progress lines.
pub type ProgressFn<'a> = dyn Fn(&str) + Send + Sync + 'a;

/// Names or paths of the external tools the conda backend shells out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub conda: String,
    pub conda_pack: String,
    pub hdfs: String,
    pub tar: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            conda: "conda".to_owned(),
            conda_pack: "conda-pack".to_owned(),
            hdfs: "hdfs".to_owned(),
            tar: "tar".to_owned(),
        }
    }
}

/// The external operations a packaging pipeline needs: exporting and packing
/// a local environment, moving archives in and out of the distributed
/// filesystem, and unpacking a downloaded archive.
#[async_trait]
pub trait PackagingBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Raw `conda env export` text for a named environment.
    async fn export_manifest(
        &self,
        env_name: &str,
        control: &RunControl,
    ) -> Result<String, RuntimeError>;

    /// Pack `env_name` into a relocatable archive at `output`, reporting each
    /// tool output line to `progress`.
    async fn pack(
        &self,
        env_name: &str,
        output: &Path,
        progress: &ProgressFn<'_>,
        control: &RunControl,
    ) -> Result<(), RuntimeError>;

    async fn dfs_put(
        &self,
        local: &Path,
        remote: &str,
        control: &RunControl,
    ) -> Result<(), RuntimeError>;

    async fn dfs_get(
        &self,
        remote: &str,
        local: &Path,
        control: &RunControl,
    ) -> Result<(), RuntimeError>;

    async fn dfs_remove(&self, remote: &str, control: &RunControl) -> Result<(), RuntimeError>;

    /// Directory new environments are created under.
    async fn envs_dir(&self, control: &RunControl) -> Result<PathBuf, RuntimeError>;

    /// Extract a gzipped tar archive into `dest`, creating it if needed.
    async fn unpack(
        &self,
        archive: &Path,
        dest: &Path,
        control: &RunControl,
    ) -> Result<(), RuntimeError>;
}

pub fn select_backend(
    name: &str,
    tools: &ToolPaths,
) -> Result<Box<dyn PackagingBackend>, RuntimeError> {
    match name {
        "conda" => Ok(Box::new(crate::conda::CondaBackend::new(tools.clone()))),
        "mock" => Ok(Box::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_backends() {
        let tools = ToolPaths::default();
        assert_eq!(select_backend("conda", &tools).unwrap().name(), "conda");
        assert_eq!(select_backend("mock", &tools).unwrap().name(), "mock");
    }

    #[test]
    fn select_invalid_backend_fails() {
        assert!(matches!(
            select_backend("docker", &ToolPaths::default()),
            Err(RuntimeError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn tool_paths_fill_missing_fields() {
        let tools: ToolPaths =
            serde_json::from_str(r#"{"conda_pack":"/opt/conda/bin/conda-pack"}"#).unwrap();
        assert_eq!(tools.conda_pack, "/opt/conda/bin/conda-pack");
        assert_eq!(tools.hdfs, "hdfs");
    }
}
