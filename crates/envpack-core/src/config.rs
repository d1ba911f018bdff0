use crate::CoreError;
use envpack_remote::GatewayConfig;
use envpack_runtime::ToolPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const TEST_NAMENODE: &str = "hdfs://dptestservice1";
const ONLINE_NAMENODE: &str = "hdfs://ms-dwh";

/// Which cluster the storage namenode belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunEnv {
    #[default]
    Test,
    Online,
}

impl RunEnv {
    /// `online` (any case) selects production; anything else is test.
    pub fn from_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("online") {
            Self::Online
        } else {
            Self::Test
        }
    }
}

/// Distributed-filesystem locations used by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageLayout {
    pub run_env: RunEnv,
    /// Overrides the namenode implied by `run_env`.
    pub namenode: Option<String>,
    /// Directory packages are staged in before adoption. Ends with `/`.
    pub staging_dir: String,
    /// Gateway-owned directory adopted packages live in. Ends with `/`.
    pub final_dir: String,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            run_env: RunEnv::Test,
            namenode: None,
            staging_dir: "/tmp/".to_owned(),
            final_dir: "/dsp/python_env_resource/".to_owned(),
        }
    }
}

fn with_trailing_slash(dir: &str) -> String {
    if dir.ends_with('/') {
        dir.to_owned()
    } else {
        format!("{dir}/")
    }
}

impl StorageLayout {
    pub fn namenode(&self) -> &str {
        match (&self.namenode, self.run_env) {
            (Some(n), _) => n.trim_end_matches('/'),
            (None, RunEnv::Test) => TEST_NAMENODE,
            (None, RunEnv::Online) => ONLINE_NAMENODE,
        }
    }

    /// `{namenode}{staging_dir}{job_id}_{artifact}`
    pub fn staging_path(&self, job_id: &str, artifact_name: &str) -> String {
        format!(
            "{}{}{job_id}_{artifact_name}",
            self.namenode(),
            with_trailing_slash(&self.staging_dir)
        )
    }

    /// Path inside the gateway namespace: `{final_dir}{artifact}`.
    pub fn final_path(&self, artifact_name: &str) -> String {
        format!("{}{artifact_name}", with_trailing_slash(&self.final_dir))
    }

    /// Fully qualified location reported for a freshly adopted artifact.
    pub fn artifact_location(&self, artifact_name: &str) -> String {
        format!("{}{}", self.namenode(), self.final_path(artifact_name))
    }
}

/// User configuration, stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvpackConfig {
    pub gateway: GatewayConfig,
    pub storage: StorageLayout,
    pub tools: ToolPaths,
    /// `conda` or `mock`.
    pub backend: String,
    pub local_tmp_dir: PathBuf,
    /// Overrides the envs directory reported by `conda info`.
    pub envs_dir: Option<PathBuf>,
    pub archive_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
}

impl Default for EnvpackConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            storage: StorageLayout::default(),
            tools: ToolPaths::default(),
            backend: "conda".to_owned(),
            local_tmp_dir: std::env::temp_dir(),
            envs_dir: None,
            archive_timeout_secs: 600,
            transfer_timeout_secs: 600,
        }
    }
}

/// `$XDG_CONFIG_HOME/envpack/config.json`, else `~/.config/envpack/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(xdg).join("envpack").join("config.json"));
    }
    std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| PathBuf::from(home).join(".config").join("envpack").join("config.json"))
}

impl EnvpackConfig {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))?;
        config.gateway.url = config.gateway.url.trim_end_matches('/').to_owned();
        Ok(config)
    }

    /// Load the default config file if it exists, otherwise defaults.
    pub fn load_default() -> Result<Self, CoreError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `ENVPACK_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get("ENVPACK_GATEWAY") {
            self.gateway.url = url.trim_end_matches('/').to_owned();
        }
        if let Some(token) = get("ENVPACK_TOKEN") {
            self.gateway.auth_token = Some(token);
        }
        if let Some(operator) = get("ENVPACK_OPERATOR") {
            self.gateway.operator_id = Some(operator);
        }
        if let Some(run_env) = get("ENVPACK_RUN_ENV") {
            self.storage.run_env = RunEnv::from_value(&run_env);
        }
        if let Some(backend) = get("ENVPACK_BACKEND") {
            self.backend = backend;
        }
    }

    pub fn archive_timeout(&self) -> Duration {
        Duration::from_secs(self.archive_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}
