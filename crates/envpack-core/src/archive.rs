use crate::job::PackagingJob;
use crate::CoreError;
use envpack_runtime::{PackagingBackend, ProgressFn, RunControl, RuntimeError};
use std::path::PathBuf;
use std::time::Duration;

/// Produces the relocatable archive for a job at its job-scoped local path.
pub struct ArchiveBuilder<'a> {
    backend: &'a dyn PackagingBackend,
    timeout: Duration,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(backend: &'a dyn PackagingBackend, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Run the packaging tool for `job`, forwarding its output to `progress`.
    ///
    /// The whole invocation is bounded by the builder's timeout and by the
    /// job's cancel token; either one kills the tool.
    pub async fn build(
        &self,
        job: &PackagingJob,
        progress: &ProgressFn<'_>,
    ) -> Result<PathBuf, CoreError> {
        let output = job.local_archive_path();
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let control = RunControl::new(job.cancel_token().clone()).with_timeout(self.timeout);
        self.backend
            .pack(job.env_name(), output, progress, &control)
            .await?;

        if !output.exists() {
            return Err(RuntimeError::Output(format!(
                "packaging reported success but {} does not exist",
                output.display()
            ))
            .into());
        }
        tracing::info!("archived {} to {}", job.env_name(), output.display());
        Ok(output.to_path_buf())
    }
}
