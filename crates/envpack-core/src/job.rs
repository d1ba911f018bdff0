use crate::config::StorageLayout;
use crate::lifecycle::{validate_transition, PipelineState};
use crate::CoreError;
use envpack_runtime::CancelToken;
use envpack_schema::{EnvironmentIdentity, JobId};
use std::path::{Path, PathBuf};

/// A local archive file that is removed when the guard is dropped.
#[derive(Debug)]
pub struct LocalArchive {
    path: PathBuf,
}

impl LocalArchive {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the file now. Returns whether a file was removed.
    pub fn remove(&self) -> std::io::Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl Drop for LocalArchive {
    fn drop(&mut self) {
        match self.remove() {
            Ok(true) => tracing::debug!("removed leftover archive {}", self.path.display()),
            Ok(false) => {}
            Err(e) => tracing::warn!("failed to remove {}: {e}", self.path.display()),
        }
    }
}

/// One packaging attempt.
///
/// Every attempt gets a fresh job id, and every path the attempt touches is
/// derived from it, so concurrent attempts for the same environment never
/// share a local or staging file.
#[derive(Debug)]
pub struct PackagingJob {
    job_id: JobId,
    identity: EnvironmentIdentity,
    artifact_name: String,
    local_archive: LocalArchive,
    staging_remote_path: String,
    final_remote_path: String,
    artifact_location: String,
    state: PipelineState,
    history: Vec<PipelineState>,
    staging_attempted: bool,
    cancel: CancelToken,
}

impl PackagingJob {
    pub fn new(
        identity: EnvironmentIdentity,
        layout: &StorageLayout,
        local_tmp_dir: &Path,
        cancel: CancelToken,
    ) -> Self {
        let job_id = JobId::generate();
        let artifact_name = identity.artifact_name();
        let local_archive =
            LocalArchive::new(local_tmp_dir.join(format!("{job_id}_{artifact_name}")));
        Self {
            staging_remote_path: layout.staging_path(&job_id, &artifact_name),
            final_remote_path: layout.final_path(&artifact_name),
            artifact_location: layout.artifact_location(&artifact_name),
            job_id,
            identity,
            artifact_name,
            local_archive,
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
            staging_attempted: false,
            cancel,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn identity(&self) -> &EnvironmentIdentity {
        &self.identity
    }

    pub fn env_name(&self) -> &str {
        &self.identity.environment_name
    }

    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    pub fn local_archive(&self) -> &LocalArchive {
        &self.local_archive
    }

    pub fn local_archive_path(&self) -> &Path {
        self.local_archive.path()
    }

    pub fn staging_remote_path(&self) -> &str {
        &self.staging_remote_path
    }

    pub fn final_remote_path(&self) -> &str {
        &self.final_remote_path
    }

    /// Namenode-qualified final path, reported to callers.
    pub fn artifact_location(&self) -> &str {
        &self.artifact_location
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state the job has been in, in order.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn staging_attempted(&self) -> bool {
        self.staging_attempted
    }

    pub(crate) fn mark_staging_attempted(&mut self) {
        self.staging_attempted = true;
    }

    pub fn advance(&mut self, to: PipelineState) -> Result<(), CoreError> {
        validate_transition(self.state, to)?;
        tracing::debug!("job {}: {} -> {to}", self.job_id, self.state);
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Move to `Failed` unless the job already reached a terminal state.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = PipelineState::Failed;
            self.history.push(PipelineState::Failed);
        }
    }
}
