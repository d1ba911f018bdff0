use crate::backend::{PackagingBackend, ProgressFn};
use crate::process::RunControl;
use crate::RuntimeError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const MOCK_MANIFEST: &str = "name: mock-env
channels:
  - defaults
dependencies:
  - ca-certificates=2024.7.2=h06a4308_0
  - openssl=3.0.14=h5eee18b_0
  - python=3.8.19=h955ad1f_0
  - zlib=1.2.13=h5eee18b_1
prefix: /opt/conda/envs/mock-env
";

/// A recorded backend operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Export(String),
    Pack { env: String, output: PathBuf },
    Put { local: PathBuf, remote: String },
    Get { remote: String, local: PathBuf },
    Remove(String),
    EnvsDir,
    Unpack { archive: PathBuf, dest: PathBuf },
}

#[derive(Default)]
struct MockState {
    calls: Vec<BackendCall>,
    manifest: Option<String>,
    pack_exit: Option<i32>,
    pack_delay: Duration,
    fail_put: bool,
    fail_remove: bool,
    envs_dir: Option<PathBuf>,
    /// Objects "stored" by `dfs_put`, keyed by remote path.
    remote: HashMap<String, Vec<u8>>,
}

/// Backend double that never shells out.
///
/// `pack` writes a small fake archive to the requested path so callers
/// exercise their real file handling and cleanup.
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn set_manifest(&self, text: &str) {
        self.with_state(|s| s.manifest = Some(text.to_owned()));
    }

    /// Make `pack` fail with this exit code after writing a partial archive.
    pub fn fail_pack_with(&self, code: i32) {
        self.with_state(|s| s.pack_exit = Some(code));
    }

    pub fn set_pack_delay(&self, delay: Duration) {
        self.with_state(|s| s.pack_delay = delay);
    }

    pub fn fail_put(&self) {
        self.with_state(|s| s.fail_put = true);
    }

    pub fn fail_remove(&self) {
        self.with_state(|s| s.fail_remove = true);
    }

    pub fn set_envs_dir(&self, dir: &Path) {
        self.with_state(|s| s.envs_dir = Some(dir.to_path_buf()));
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn remote_paths(&self) -> Vec<String> {
        self.with_state(|s| {
            let mut paths: Vec<String> = s.remote.keys().cloned().collect();
            paths.sort();
            paths
        })
    }

    fn record(&self, call: BackendCall) {
        self.with_state(|s| s.calls.push(call));
    }
}

/// Sleep for `delay` while honoring the control's cancel token and deadline.
async fn simulate_work(
    program: &str,
    delay: Duration,
    control: &RunControl,
) -> Result<(), RuntimeError> {
    if control.cancel.is_cancelled() {
        return Err(RuntimeError::Cancelled(program.to_owned()));
    }
    if delay.is_zero() {
        return Ok(());
    }
    let limit = control.timeout.unwrap_or(Duration::MAX);
    tokio::select! {
        () = tokio::time::sleep(delay.min(limit)) => {
            if delay > limit {
                Err(RuntimeError::Timeout {
                    program: program.to_owned(),
                    secs: limit.as_secs(),
                })
            } else {
                Ok(())
            }
        }
        () = control.cancel.cancelled() => Err(RuntimeError::Cancelled(program.to_owned())),
    }
}

#[async_trait]
impl PackagingBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    async fn export_manifest(
        &self,
        env_name: &str,
        control: &RunControl,
    ) -> Result<String, RuntimeError> {
        self.record(BackendCall::Export(env_name.to_owned()));
        simulate_work("conda", Duration::ZERO, control).await?;
        Ok(self.with_state(|s| {
            s.manifest
                .clone()
                .unwrap_or_else(|| MOCK_MANIFEST.replace("mock-env", env_name))
        }))
    }

    async fn pack(
        &self,
        env_name: &str,
        output: &Path,
        progress: &ProgressFn<'_>,
        control: &RunControl,
    ) -> Result<(), RuntimeError> {
        self.record(BackendCall::Pack {
            env: env_name.to_owned(),
            output: output.to_path_buf(),
        });
        let (exit, delay) = self.with_state(|s| (s.pack_exit, s.pack_delay));

        progress(&format!("Collecting packages for {env_name}..."));
        tokio::fs::write(output, format!("mock-archive:{env_name}\n")).await?;
        simulate_work("conda-pack", delay, control).await?;

        if let Some(code) = exit {
            progress("CondaPackError: mock failure");
            return Err(RuntimeError::Subprocess {
                program: "conda-pack".to_owned(),
                code: Some(code),
                tail: vec![
                    format!("Collecting packages for {env_name}..."),
                    "CondaPackError: mock failure".to_owned(),
                ],
            });
        }

        progress(&format!("Packing environment at '{}'", output.display()));
        progress("[########################################] | 100% Completed");
        Ok(())
    }

    async fn dfs_put(
        &self,
        local: &Path,
        remote: &str,
        control: &RunControl,
    ) -> Result<(), RuntimeError> {
        self.record(BackendCall::Put {
            local: local.to_path_buf(),
            remote: remote.to_owned(),
        });
        simulate_work("hdfs", Duration::ZERO, control).await?;
        if self.with_state(|s| s.fail_put) {
            return Err(RuntimeError::Subprocess {
                program: "hdfs".to_owned(),
                code: Some(1),
                tail: vec![format!("put: `{remote}': Permission denied")],
            });
        }
        let bytes = tokio::fs::read(local).await?;
        self.with_state(|s| s.remote.insert(remote.to_owned(), bytes));
        Ok(())
    }

    async fn dfs_get(
        &self,
        remote: &str,
        local: &Path,
        control: &RunControl,
    ) -> Result<(), RuntimeError> {
        self.record(BackendCall::Get {
            remote: remote.to_owned(),
            local: local.to_path_buf(),
        });
        simulate_work("hdfs", Duration::ZERO, control).await?;
        let bytes = self.with_state(|s| {
            s.remote
                .get(remote)
                .cloned()
                .unwrap_or_else(|| format!("mock-archive:{remote}\n").into_bytes())
        });
        tokio::fs::write(local, bytes).await?;
        Ok(())
    }

    async fn dfs_remove(&self, remote: &str, control: &RunControl) -> Result<(), RuntimeError> {
        self.record(BackendCall::Remove(remote.to_owned()));
        simulate_work("hdfs", Duration::ZERO, control).await?;
        if self.with_state(|s| s.fail_remove) {
            return Err(RuntimeError::Subprocess {
                program: "hdfs".to_owned(),
                code: Some(1),
                tail: vec![format!("rm: `{remote}': No such file or directory")],
            });
        }
        self.with_state(|s| s.remote.remove(remote));
        Ok(())
    }

    async fn envs_dir(&self, _control: &RunControl) -> Result<PathBuf, RuntimeError> {
        self.record(BackendCall::EnvsDir);
        Ok(self.with_state(|s| {
            s.envs_dir
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("envpack-mock-envs"))
        }))
    }

    async fn unpack(
        &self,
        archive: &Path,
        dest: &Path,
        control: &RunControl,
    ) -> Result<(), RuntimeError> {
        self.record(BackendCall::Unpack {
            archive: archive.to_path_buf(),
            dest: dest.to_path_buf(),
        });
        simulate_work("tar", Duration::ZERO, control).await?;
        let contents = tokio::fs::read(archive).await?;
        let meta = dest.join("conda-meta");
        tokio::fs::create_dir_all(&meta).await?;
        tokio::fs::write(meta.join("envpack-mock"), contents).await?;
        Ok(())
    }
}
