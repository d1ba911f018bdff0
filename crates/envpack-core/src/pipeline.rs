use crate::archive::ArchiveBuilder;
use crate::config::{EnvpackConfig, StorageLayout};
use crate::job::{LocalArchive, PackagingJob};
use crate::lifecycle::PipelineState;
use crate::transfer::{ArtifactTransfer, CleanupReport};
use crate::{stage_error, CoreError, Stage, StageContext};
use chrono::{DateTime, Utc};
use envpack_remote::{
    GatewayApi, NameCheck, RegisterEnvironment, RegistrationClient, RemoteError, ReuseDecision,
    ReuseResolver, UploadPackageRequest,
};
use envpack_runtime::{CancelToken, PackagingBackend, ProgressFn, RunControl, RuntimeError};
use envpack_schema::{
    validate_env_name, EnvironmentIdentity, EnvironmentManifest, Fingerprint, JobId,
    MarkerStatus, ProjectId, PythonVersion, SessionContext,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Paths and bounds the pipeline runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub storage: StorageLayout,
    pub local_tmp_dir: PathBuf,
    pub envs_dir: Option<PathBuf>,
    pub archive_timeout: Duration,
    pub transfer_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&EnvpackConfig::default())
    }
}

impl From<&EnvpackConfig> for PipelineSettings {
    fn from(config: &EnvpackConfig) -> Self {
        Self {
            storage: config.storage.clone(),
            local_tmp_dir: config.local_tmp_dir.clone(),
            envs_dir: config.envs_dir.clone(),
            archive_timeout: config.archive_timeout(),
            transfer_timeout: config.transfer_timeout(),
        }
    }
}

/// Result of a successful `package` run.
#[derive(Debug, Clone, Serialize)]
pub struct PackageOutcome {
    pub env_name: String,
    pub job_id: JobId,
    pub fingerprint: Fingerprint,
    pub markers: MarkerStatus,
    /// Where the packaged environment lives.
    pub artifact_path: String,
    /// True when an existing artifact was reused and nothing was built.
    pub reused: bool,
    pub staging_path: Option<String>,
    pub states: Vec<PipelineState>,
    pub cleanup: Option<CleanupReport>,
    pub completed_at: DateTime<Utc>,
}

/// Result of a successful `submit` run.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub package: PackageOutcome,
    pub python_version: PythonVersion,
    pub created_by: String,
    pub level: u32,
}

/// Result of a successful `download` run.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub env_name: String,
    pub job_id: JobId,
    pub remote_path: String,
    pub install_dir: PathBuf,
    pub completed_at: DateTime<Utc>,
}

/// Packages, submits and downloads environments.
///
/// Stages run strictly in sequence. Gateway calls are blocking and run on
/// the blocking pool; subprocess stages are async and honor the caller's
/// cancel token.
pub struct Pipeline {
    gateway: Arc<dyn GatewayApi>,
    backend: Arc<dyn PackagingBackend>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        gateway: Arc<dyn GatewayApi>,
        backend: Arc<dyn PackagingBackend>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            gateway,
            backend,
            settings,
        }
    }

    async fn on_gateway<T, F>(&self, call: F) -> Result<T, CoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn GatewayApi) -> T + Send + 'static,
    {
        let gateway = Arc::clone(&self.gateway);
        tokio::task::spawn_blocking(move || call(gateway.as_ref()))
            .await
            .map_err(|e| CoreError::Task(e.to_string()))
    }

    fn control(&self, cancel: &CancelToken) -> RunControl {
        RunControl::new(cancel.clone()).with_timeout(self.settings.transfer_timeout)
    }

    /// Capture the current export of a local environment.
    pub async fn export_manifest(
        &self,
        env_name: &str,
        cancel: &CancelToken,
    ) -> Result<EnvironmentManifest, CoreError> {
        validate_env_name(env_name).at_stage(env_name, Stage::Validate)?;
        let text = self
            .backend
            .export_manifest(env_name, &self.control(cancel))
            .await
            .at_stage(env_name, Stage::Export)?;
        Ok(EnvironmentManifest::new(text))
    }

    /// Ask the gateway whether `env_name` can be registered for this manifest.
    pub async fn check_name(
        &self,
        session: &SessionContext,
        env_name: &str,
        manifest: &EnvironmentManifest,
    ) -> Result<NameCheck, CoreError> {
        let project = session.project_id.clone();
        let name = env_name.to_owned();
        let text = manifest.text().to_owned();
        let answer = self
            .on_gateway(move |gw| gw.check_name(&project, &name, &text))
            .await
            .at_stage(env_name, Stage::NameCheck)?
            .at_stage(env_name, Stage::NameCheck)?;
        Ok(NameCheck::from_response(env_name, &answer))
    }

    /// Package a local environment, reusing an existing artifact when the
    /// gateway already has one for the same dependency set.
    pub async fn package(
        &self,
        session: &SessionContext,
        env_name: &str,
        progress: &ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<PackageOutcome, CoreError> {
        let identity = session.identity(env_name);
        identity.validate().at_stage(env_name, Stage::Validate)?;
        let manifest = self.export_manifest(env_name, cancel).await?;
        self.package_manifest(identity, &manifest, progress, cancel)
            .await
    }

    async fn package_manifest(
        &self,
        identity: EnvironmentIdentity,
        manifest: &EnvironmentManifest,
        progress: &ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<PackageOutcome, CoreError> {
        let env_name = identity.environment_name.clone();
        let mut job = PackagingJob::new(
            identity,
            &self.settings.storage,
            &self.settings.local_tmp_dir,
            cancel.clone(),
        );
        info!("packaging {env_name} (job {})", job.job_id());
        job.advance(PipelineState::ManifestExported)?;

        let normalized = manifest.normalize();
        if !normalized.markers.is_complete() {
            warn!(
                "manifest of {env_name} is malformed ({}); fingerprinting an empty dependency list",
                normalized.markers
            );
        }
        debug!(
            "{env_name}: {} dependencies, fingerprint {}",
            normalized.dependency_count(),
            normalized.fingerprint.short()
        );
        job.advance(PipelineState::FingerprintChecked)?;

        let decision = self.check_reusable(&job.identity().project_id, manifest).await;
        if decision.is_reusable() {
            job.advance(PipelineState::ShortCircuitDone)?;
            info!("{env_name}: reusing {}", decision.artifact_path);
            progress(&format!("Reusing existing package {}", decision.artifact_path));
            return Ok(PackageOutcome {
                env_name,
                job_id: job.job_id().clone(),
                fingerprint: normalized.fingerprint,
                markers: normalized.markers,
                artifact_path: decision.artifact_path,
                reused: true,
                staging_path: None,
                states: job.history().to_vec(),
                cleanup: None,
                completed_at: Utc::now(),
            });
        }

        if cancel.is_cancelled() {
            job.fail();
            return Err(stage_error(
                &env_name,
                Stage::Archive,
                RuntimeError::Cancelled(env_name.clone()),
            ));
        }

        job.advance(PipelineState::Building)?;
        let built = self.build_stage_adopt(&mut job, progress).await;

        let transfer = ArtifactTransfer::new(self.backend.as_ref(), self.settings.transfer_timeout);
        let cleanup = transfer.cleanup(&job).await;

        match built {
            Ok(()) => {
                job.advance(PipelineState::Cleaned)?;
                info!("{env_name}: packaged to {}", job.artifact_location());
                Ok(PackageOutcome {
                    env_name,
                    job_id: job.job_id().clone(),
                    fingerprint: normalized.fingerprint,
                    markers: normalized.markers,
                    artifact_path: job.artifact_location().to_owned(),
                    reused: false,
                    staging_path: Some(job.staging_remote_path().to_owned()),
                    states: job.history().to_vec(),
                    cleanup: Some(cleanup),
                    completed_at: Utc::now(),
                })
            }
            Err(e) => {
                job.fail();
                debug!("{env_name}: job {} failed after cleanup", job.job_id());
                Err(e)
            }
        }
    }

    async fn check_reusable(
        &self,
        project: &ProjectId,
        manifest: &EnvironmentManifest,
    ) -> ReuseDecision {
        let project = project.clone();
        let text = manifest.text().to_owned();
        self.on_gateway(move |gw| ReuseResolver::new(gw).check_reusable(&project, &text))
            .await
            .unwrap_or_else(|e| {
                warn!("reuse check did not complete, building fresh: {e}");
                ReuseDecision::not_found()
            })
    }

    async fn build_stage_adopt(
        &self,
        job: &mut PackagingJob,
        progress: &ProgressFn<'_>,
    ) -> Result<(), CoreError> {
        let env_name = job.env_name().to_owned();

        ArchiveBuilder::new(self.backend.as_ref(), self.settings.archive_timeout)
            .build(job, progress)
            .await
            .at_stage(&env_name, Stage::Archive)?;
        job.advance(PipelineState::Archived)?;

        progress(&format!("Uploading to {}", job.staging_remote_path()));
        ArtifactTransfer::new(self.backend.as_ref(), self.settings.transfer_timeout)
            .stage(job)
            .await
            .at_stage(&env_name, Stage::Staging)?;
        job.advance(PipelineState::Staged)?;

        let request = UploadPackageRequest {
            project_id: job.identity().project_id.clone(),
            name: job.artifact_name().to_owned(),
            src_path: job.staging_remote_path().to_owned(),
            target_path: job.final_remote_path().to_owned(),
        };
        self.on_gateway(move |gw| RegistrationClient::new(gw).adopt_package(&request))
            .await
            .at_stage(&env_name, Stage::Adopt)?
            .at_stage(&env_name, Stage::Adopt)?;
        job.advance(PipelineState::Registered)?;
        Ok(())
    }

    /// Package an environment and register it by name so it can be found
    /// and downloaded later.
    pub async fn submit(
        &self,
        session: &SessionContext,
        env_name: &str,
        python: Option<PythonVersion>,
        progress: &ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<SubmitOutcome, CoreError> {
        session
            .identity(env_name)
            .validate()
            .at_stage(env_name, Stage::Validate)?;
        let manifest = self.export_manifest(env_name, cancel).await?;

        let mut identity = session.identity(env_name);
        identity.python_version = python.or_else(|| manifest.python_version());
        let python_version = *identity
            .validate_for_submit()
            .at_stage(env_name, Stage::Validate)?;

        match self.check_name(session, env_name, &manifest).await? {
            NameCheck::Available => {}
            NameCheck::NameTaken => {
                return Err(stage_error(
                    env_name,
                    Stage::NameCheck,
                    CoreError::Validation(format!(
                        "an environment named '{env_name}' already exists in project {}",
                        session.project_id
                    )),
                ));
            }
            NameCheck::DuplicateOf(existing) => {
                return Err(stage_error(
                    env_name,
                    Stage::NameCheck,
                    CoreError::Validation(format!(
                        "an identical environment is already registered as '{existing}'"
                    )),
                ));
            }
        }

        let package = self
            .package_manifest(identity, &manifest, progress, cancel)
            .await?;

        progress(&format!("Registering environment {env_name}"));
        let request = RegisterEnvironment {
            project_id: session.project_id.clone(),
            name: env_name.to_owned(),
            remote_path: package.artifact_path.clone(),
            manifest_text: manifest.text().to_owned(),
            created_by: session.created_by.clone(),
            level: session.level,
            python_version: python_version.to_string(),
        };
        self.on_gateway(move |gw| RegistrationClient::new(gw).register(&request))
            .await
            .at_stage(env_name, Stage::Register)?
            .at_stage(env_name, Stage::Register)?;
        info!("{env_name}: submitted as {}", package.artifact_path);

        Ok(SubmitOutcome {
            package,
            python_version,
            created_by: session.created_by.clone(),
            level: session.level,
        })
    }

    /// Fetch a registered environment and unpack it into the local envs
    /// directory as `{envs_dir}/{env_name}`.
    pub async fn download(
        &self,
        session: &SessionContext,
        env_name: &str,
        level: Option<u32>,
        cancel: &CancelToken,
    ) -> Result<DownloadOutcome, CoreError> {
        session
            .identity(env_name)
            .validate()
            .at_stage(env_name, Stage::Validate)?;

        let project = session.project_id.clone();
        let name = env_name.to_owned();
        let level = level.unwrap_or(session.level);
        let meta = self
            .on_gateway(move |gw| gw.env_meta(&project, &name, level))
            .await
            .at_stage(env_name, Stage::Resolve)?
            .at_stage(env_name, Stage::Resolve)?;
        if meta.hdfs_path.trim().is_empty() {
            return Err(stage_error(
                env_name,
                Stage::Resolve,
                RemoteError::Logic(format!("gateway returned no storage path for '{env_name}'")),
            ));
        }

        let job_id = JobId::generate();
        let archive = LocalArchive::new(
            self.settings
                .local_tmp_dir
                .join(format!("{job_id}.tar.gz")),
        );
        ArtifactTransfer::new(self.backend.as_ref(), self.settings.transfer_timeout)
            .fetch(&meta.hdfs_path, archive.path(), cancel)
            .await
            .at_stage(env_name, Stage::Fetch)?;

        let control = self.control(cancel);
        let envs_dir = match &self.settings.envs_dir {
            Some(dir) => dir.clone(),
            None => self
                .backend
                .envs_dir(&control)
                .await
                .at_stage(env_name, Stage::Unpack)?,
        };
        let install_dir = envs_dir.join(env_name);
        if install_dir.exists() {
            warn!(
                "{} already exists; unpacking over it",
                install_dir.display()
            );
        }
        self.backend
            .unpack(archive.path(), &install_dir, &control)
            .await
            .at_stage(env_name, Stage::Unpack)?;

        if let Err(e) = archive.remove() {
            warn!("failed to remove {}: {e}", archive.path().display());
        }
        info!("{env_name}: installed into {}", install_dir.display());

        Ok(DownloadOutcome {
            env_name: env_name.to_owned(),
            job_id,
            remote_path: meta.hdfs_path,
            install_dir,
            completed_at: Utc::now(),
        })
    }
}
