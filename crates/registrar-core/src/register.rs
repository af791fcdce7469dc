//! Model registration flow
//!
//! Two ways to get a model into the registry:
//! - From the training run recorded in `experiment_info.json`
//! - Directly from the saved model file, in a fresh run
//!
//! [`Registrar::register`] tries the first and falls back to the second when
//! the run record or its artifact is unusable. Either way the new version is
//! moved to the configured stage and the result is written to
//! `registered_model_info.json`.

use crate::config::RegistrarConfig;
use crate::descriptor::{self, DESCRIPTOR_FILE};
use crate::error::{RegistrationError, RegistrationResult};
use crate::metadata::{load_model_info, save_registered_model_info_with_stage};
use crate::verify::verify_run_artifacts;
use registrar_tracking::{
    name_filter, ModelUri, ModelVersion, ModelVersionStatus, RunInfo, RunStatus, Stage,
    TrackingClient,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a registered version came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOrigin {
    /// Registered from an existing training run
    FromRun { run_id: String },
    /// Uploaded from a saved model file
    FromFile { path: PathBuf },
}

/// Result of the full registration flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    /// Registered model name
    pub model_name: String,
    /// New version
    pub version: String,
    /// Stage the version was moved to
    pub stage: Stage,
    /// How the version was produced
    pub origin: RegistrationOrigin,
}

impl fmt::Display for RegistrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            RegistrationOrigin::FromRun { run_id } => write!(
                f,
                "Model '{}' version {} successfully registered from run {}!",
                self.model_name, self.version, run_id
            ),
            RegistrationOrigin::FromFile { .. } => write!(
                f,
                "Model '{}' version {} successfully registered from file!",
                self.model_name, self.version
            ),
        }
    }
}

/// Registers models with a tracking service and stages them
pub struct Registrar {
    client: Arc<dyn TrackingClient>,
    config: RegistrarConfig,
}

impl Registrar {
    /// Create a registrar over a tracking client
    #[inline]
    #[must_use]
    pub fn new(client: Arc<dyn TrackingClient>, config: RegistrarConfig) -> Self {
        Self { client, config }
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    /// Run the full registration flow
    ///
    /// # Workflow
    /// 1. Load the experiment record and register from its run
    /// 2. On a missing/malformed record or missing artifact, register the saved model file
    /// 3. Save the registration record
    ///
    /// # Errors
    /// Any failure outside the fallback conditions, and any failure of the fallback itself.
    pub async fn register(&self) -> RegistrationResult<RegistrationOutcome> {
        match self.try_register().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!("Failed to complete the model registration process: {}", e);
                Err(e)
            }
        }
    }

    async fn try_register(&self) -> RegistrationResult<RegistrationOutcome> {
        let model_name = self.config.model_name.as_str();

        let (version, origin) = match self.register_from_experiment_info(model_name).await {
            Ok((version, run_id)) => (version, RegistrationOrigin::FromRun { run_id }),
            Err(e) if e.is_fallback_eligible() => {
                tracing::warn!("Could not register from existing run: {}", e);
                tracing::info!("Attempting to register model directly from file...");

                let path = self.config.paths.model_file.clone();
                let version = self.register_model_directly(&path, model_name).await?;
                (version, RegistrationOrigin::FromFile { path })
            }
            Err(e) => return Err(e),
        };

        save_registered_model_info_with_stage(
            model_name,
            &version,
            self.config.target_stage,
            &self.config.paths.registered_model_info,
        )
        .await?;

        Ok(RegistrationOutcome {
            model_name: model_name.to_string(),
            version,
            stage: self.config.target_stage,
            origin,
        })
    }

    async fn register_from_experiment_info(
        &self,
        model_name: &str,
    ) -> RegistrationResult<(String, String)> {
        let info = load_model_info(&self.config.paths.experiment_info).await?;
        tracing::info!(
            "Retrieved run_id: {}, model_path: {}",
            info.run_id,
            info.model_path
        );

        let version = self
            .register_model_from_run(&info.run_id, &info.model_path, model_name)
            .await?;
        Ok((version, info.run_id))
    }

    /// Register the model artifact of an existing run and stage it
    ///
    /// # Errors
    /// - `RegistrationError::ArtifactMissing` if `model_path` is not a top-level artifact of the run
    /// - `RegistrationError::Tracking` for registry failures
    pub async fn register_model_from_run(
        &self,
        run_id: &str,
        model_path: &str,
        model_name: &str,
    ) -> RegistrationResult<String> {
        match self.try_register_from_run(run_id, model_path, model_name).await {
            Ok(version) => Ok(version),
            Err(e) => {
                tracing::error!("Error during model registration: {}", e);
                Err(e)
            }
        }
    }

    async fn try_register_from_run(
        &self,
        run_id: &str,
        model_path: &str,
        model_name: &str,
    ) -> RegistrationResult<String> {
        let artifacts = verify_run_artifacts(self.client.as_ref(), run_id).await;
        if !artifacts.iter().any(|a| a == model_path) {
            return Err(RegistrationError::ArtifactMissing {
                path: model_path.to_string(),
                available: artifacts,
            });
        }

        let model_uri = ModelUri::from_run(run_id, model_path);
        tracing::info!("Model URI: {}", model_uri);

        let run = self.client.get_run(run_id).await?;
        let source = run.artifact_location(model_uri.artifact_path());

        let created = self.create_version(model_name, &source, run_id).await?;
        tracing::info!(
            "Model registered with name: {}, version: {}",
            created.name,
            created.version
        );

        let ready = self.await_ready(created).await?;
        self.stage_version(model_name, &ready.version).await?;
        Ok(ready.version)
    }

    /// Upload a saved model file into a new run, register it and stage it
    ///
    /// The run is finished as `FINISHED` on success and `FAILED` otherwise.
    ///
    /// # Errors
    /// - `RegistrationError::ModelFile` if the file cannot be read
    /// - `RegistrationError::NoVersions` if the registry lists no versions afterwards
    /// - `RegistrationError::Tracking` for tracking failures
    pub async fn register_model_directly(
        &self,
        model_file_path: &Path,
        model_name: &str,
    ) -> RegistrationResult<String> {
        match self.try_register_directly(model_file_path, model_name).await {
            Ok(version) => Ok(version),
            Err(e) => {
                tracing::error!("Error during direct model registration: {}", e);
                Err(e)
            }
        }
    }

    async fn try_register_directly(
        &self,
        model_file_path: &Path,
        model_name: &str,
    ) -> RegistrationResult<String> {
        let content = tokio::fs::read(model_file_path)
            .await
            .map_err(|source| RegistrationError::ModelFile {
                path: model_file_path.to_path_buf(),
                source,
            })?;
        tracing::info!("Model loaded from {}", model_file_path.display());

        let run_name = format!("register-{model_name}");
        let run = self
            .client
            .create_run(&self.config.experiment_id, Some(run_name.as_str()))
            .await?;

        let result = self
            .register_in_run(&run, model_file_path, content, model_name)
            .await;

        let status = if result.is_ok() {
            RunStatus::Finished
        } else {
            RunStatus::Failed
        };
        if let Err(e) = self.client.update_run(&run.run_id, status).await {
            tracing::warn!(run_id = %run.run_id, "failed to end run: {}", e);
        }

        result
    }

    async fn register_in_run(
        &self,
        run: &RunInfo,
        model_file_path: &Path,
        content: Vec<u8>,
        model_name: &str,
    ) -> RegistrationResult<String> {
        let artifact_dir = self.config.artifact_path.trim_matches('/');
        let file_name = model_file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("model.pkl");

        self.client
            .log_artifact(run, &format!("{artifact_dir}/{file_name}"), content)
            .await?;
        let mlmodel = descriptor::render(artifact_dir, file_name, &run.run_id)?;
        self.client
            .log_artifact(
                run,
                &format!("{artifact_dir}/{DESCRIPTOR_FILE}"),
                mlmodel.into_bytes(),
            )
            .await?;
        tracing::info!("Model logged and registered to MLflow");

        let source = run.artifact_location(artifact_dir);
        let created = self.create_version(model_name, &source, &run.run_id).await?;
        let ready = self.await_ready(created).await?;

        let latest = self
            .latest_version(model_name)
            .await?
            .ok_or_else(|| RegistrationError::NoVersions {
                model_name: model_name.to_string(),
            })?;
        if ready.version_number() != Some(latest) {
            tracing::warn!(
                created = %ready.version,
                latest,
                "registry reports a newer version than the one just created"
            );
        }
        tracing::info!(
            "Model registered with name: {}, version: {}",
            model_name,
            ready.version
        );

        self.stage_version(model_name, &ready.version).await?;
        Ok(ready.version)
    }

    async fn create_version(
        &self,
        model_name: &str,
        source: &str,
        run_id: &str,
    ) -> RegistrationResult<ModelVersion> {
        self.client.create_registered_model(model_name).await?;
        let version = self
            .client
            .create_model_version(model_name, source, Some(run_id))
            .await?;
        Ok(version)
    }

    /// Poll until the version leaves `PENDING_REGISTRATION`
    async fn await_ready(&self, mut version: ModelVersion) -> RegistrationResult<ModelVersion> {
        let settings = self.config.registration;
        let mut attempts = 0;

        loop {
            match version.status {
                ModelVersionStatus::Ready => return Ok(version),
                ModelVersionStatus::FailedRegistration => {
                    return Err(RegistrationError::VersionFailed {
                        model_name: version.name,
                        version: version.version,
                    })
                }
                ModelVersionStatus::PendingRegistration => {}
            }

            if attempts >= settings.ready_max_attempts {
                return Err(RegistrationError::VersionNotReady {
                    model_name: version.name,
                    version: version.version,
                    attempts,
                });
            }

            tracing::debug!(
                model = %version.name,
                version = %version.version,
                attempt = attempts + 1,
                "waiting for model version to become ready"
            );
            tokio::time::sleep(settings.poll_interval()).await;
            version = self
                .client
                .get_model_version(&version.name, &version.version)
                .await?;
            attempts += 1;
        }
    }

    async fn stage_version(&self, model_name: &str, version: &str) -> RegistrationResult<ModelVersion> {
        let stage = self.config.target_stage;
        let staged = self
            .client
            .transition_model_version_stage(
                model_name,
                version,
                stage,
                self.config.archive_existing_versions,
            )
            .await?;
        tracing::info!("Model version {} transitioned to {}", version, stage);
        Ok(staged)
    }

    /// Highest numeric version of a registered model
    ///
    /// Non-numeric versions are ignored; `None` when the model has no versions.
    ///
    /// # Errors
    /// - `RegistrationError::Tracking` if the search fails
    pub async fn latest_version(&self, model_name: &str) -> RegistrationResult<Option<u64>> {
        let versions = self
            .client
            .search_model_versions(&name_filter(model_name))
            .await?;
        Ok(versions
            .iter()
            .filter(|v| v.name == model_name)
            .filter_map(ModelVersion::version_number)
            .max())
    }

    /// Move an existing version to a stage
    ///
    /// # Errors
    /// - `RegistrationError::Tracking` if the transition is rejected
    pub async fn transition(
        &self,
        model_name: &str,
        version: &str,
        stage: Stage,
        archive_existing_versions: bool,
    ) -> RegistrationResult<ModelVersion> {
        let staged = self
            .client
            .transition_model_version_stage(model_name, version, stage, archive_existing_versions)
            .await
            .map_err(|e| {
                tracing::error!("Error transitioning {} version {}: {}", model_name, version, e);
                e
            })?;
        tracing::info!("Model version {} transitioned to {}", version, stage);
        Ok(staged)
    }
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
