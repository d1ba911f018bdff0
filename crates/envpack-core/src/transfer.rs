use crate::job::PackagingJob;
use crate::CoreError;
use envpack_runtime::{CancelToken, PackagingBackend, RunControl};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// What cleanup managed to remove. Failures are recorded, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub local_removed: bool,
    pub staging_removed: bool,
    pub warnings: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Moves archives between the local machine and the distributed filesystem.
pub struct ArtifactTransfer<'a> {
    backend: &'a dyn PackagingBackend,
    timeout: Duration,
}

impl<'a> ArtifactTransfer<'a> {
    pub fn new(backend: &'a dyn PackagingBackend, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    fn control(&self, cancel: &CancelToken) -> RunControl {
        RunControl::new(cancel.clone()).with_timeout(self.timeout)
    }

    /// Upload the job's local archive to its staging path.
    pub async fn stage(&self, job: &mut PackagingJob) -> Result<(), CoreError> {
        job.mark_staging_attempted();
        let control = self.control(job.cancel_token());
        tracing::info!(
            "staging {} to {}",
            job.local_archive_path().display(),
            job.staging_remote_path()
        );
        self.backend
            .dfs_put(job.local_archive_path(), job.staging_remote_path(), &control)
            .await?;
        Ok(())
    }

    /// Download `remote` to `local`.
    pub async fn fetch(
        &self,
        remote: &str,
        local: &Path,
        cancel: &CancelToken,
    ) -> Result<(), CoreError> {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tracing::info!("fetching {remote} to {}", local.display());
        self.backend
            .dfs_get(remote, local, &self.control(cancel))
            .await?;
        Ok(())
    }

    /// Remove the local archive, then the staging copy if staging was
    /// attempted. Runs even after cancellation.
    pub async fn cleanup(&self, job: &PackagingJob) -> CleanupReport {
        let mut report = CleanupReport::default();

        match job.local_archive().remove() {
            Ok(removed) => report.local_removed = removed,
            Err(e) => {
                let msg = format!(
                    "failed to remove local archive {}: {e}",
                    job.local_archive_path().display()
                );
                tracing::warn!("{msg}");
                report.warnings.push(msg);
            }
        }

        if job.staging_attempted() {
            let control = self.control(&CancelToken::new());
            match self
                .backend
                .dfs_remove(job.staging_remote_path(), &control)
                .await
            {
                Ok(()) => report.staging_removed = true,
                Err(e) => {
                    let msg = format!(
                        "failed to remove staged archive {}: {e}",
                        job.staging_remote_path()
                    );
                    tracing::warn!("{msg}");
                    report.warnings.push(msg);
                }
            }
        }

        report
    }
}
