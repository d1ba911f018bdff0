use crate::backend::{PackagingBackend, ProgressFn, ToolPaths};
use crate::prereq::command_exists;
use crate::process::{run_captured, run_streaming, RunControl, ToolCommand};
use crate::RuntimeError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Backend that drives the real `conda`, `conda-pack`, `hdfs` and `tar`
/// executables.
pub struct CondaBackend {
    tools: ToolPaths,
}

impl CondaBackend {
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }

    fn hdfs(&self) -> ToolCommand {
        ToolCommand::new(&self.tools.hdfs).arg("dfs")
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// First entry of `envs_dirs` in `conda info --json` output.
pub fn parse_envs_dir(info_json: &str) -> Result<PathBuf, RuntimeError> {
    let info: serde_json::Value = serde_json::from_str(info_json)
        .map_err(|e| RuntimeError::Output(format!("conda info is not JSON: {e}")))?;
    info.get("envs_dirs")
        .and_then(serde_json::Value::as_array)
        .and_then(|dirs| dirs.first())
        .and_then(serde_json::Value::as_str)
        .filter(|d| !d.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| RuntimeError::Output("conda info reports no envs_dirs".to_owned()))
}

#[async_trait]
impl PackagingBackend for CondaBackend {
    fn name(&self) -> &'static str {
        "conda"
    }

    fn available(&self) -> bool {
        command_exists(&self.tools.conda) && command_exists(&self.tools.conda_pack)
    }

    async fn export_manifest(
        &self,
        env_name: &str,
        control: &RunControl,
    ) -> Result<String, RuntimeError> {
        let cmd = ToolCommand::new(&self.tools.conda).args(["env", "export", "-n", env_name]);
        let out = run_captured(&cmd, control).await?;
        Ok(out.stdout)
    }

    async fn pack(
        &self,
        env_name: &str,
        output: &Path,
        progress: &ProgressFn<'_>,
        control: &RunControl,
    ) -> Result<(), RuntimeError> {
        let cmd = ToolCommand::new(&self.tools.conda_pack)
            .args(["-n", env_name, "-o"])
            .arg(path_arg(output));
        tracing::info!("packing environment {env_name} into {}", output.display());
        run_streaming(&cmd, control, progress).await?;
        Ok(())
    }

    async fn dfs_put(
        &self,
        local: &Path,
        remote: &str,
        control: &RunControl,
    ) -> Result<(), RuntimeError> {
        let cmd = self.hdfs().arg("-put").arg(path_arg(local)).arg(remote);
        run_captured(&cmd, control).await?;
        Ok(())
    }

    async fn dfs_get(
        &self,
        remote: &str,
        local: &Path,
        control: &RunControl,
    ) -> Result<(), RuntimeError> {
        let cmd = self.hdfs().arg("-get").arg(remote).arg(path_arg(local));
        run_captured(&cmd, control).await?;
        Ok(())
    }

    async fn dfs_remove(&self, remote: &str, control: &RunControl) -> Result<(), RuntimeError> {
        let cmd = self.hdfs().arg("-rm").arg(remote);
        run_captured(&cmd, control).await?;
        Ok(())
    }

    async fn envs_dir(&self, control: &RunControl) -> Result<PathBuf, RuntimeError> {
        let cmd = ToolCommand::new(&self.tools.conda).args(["info", "--json"]);
        let out = run_captured(&cmd, control).await?;
        parse_envs_dir(&out.stdout)
    }

    async fn unpack(
        &self,
        archive: &Path,
        dest: &Path,
        control: &RunControl,
    ) -> Result<(), RuntimeError> {
        tokio::fs::create_dir_all(dest).await?;
        let cmd = ToolCommand::new(&self.tools.tar)
            .arg("-xzf")
            .arg(path_arg(archive))
            .arg("-C")
            .arg(path_arg(dest));
        run_captured(&cmd, control).await?;
        Ok(())
    }
}
