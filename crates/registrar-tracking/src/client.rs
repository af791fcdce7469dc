//! The tracking client abstraction
//!
//! Everything the registrar needs from a tracking service goes through
//! [`TrackingClient`], so the registration flow can run against the real
//! MLflow REST API or an in-memory fake.

use crate::error::TrackingResult;
use crate::types::{FileInfo, ModelVersion, RunInfo, RunStatus, Stage};
use async_trait::async_trait;

/// Operations offered by an MLflow-compatible tracking service
#[async_trait]
pub trait TrackingClient: Send + Sync {
    /// Fetch run metadata
    async fn get_run(&self, run_id: &str) -> TrackingResult<RunInfo>;

    /// Start a new run in an experiment
    async fn create_run(&self, experiment_id: &str, run_name: Option<&str>)
        -> TrackingResult<RunInfo>;

    /// Set a run's status, ending it when the status is terminal
    async fn update_run(&self, run_id: &str, status: RunStatus) -> TrackingResult<()>;

    /// List artifacts directly under `path` (the artifact root when `None`)
    async fn list_artifacts(&self, run_id: &str, path: Option<&str>)
        -> TrackingResult<Vec<FileInfo>>;

    /// Upload bytes to `artifact_path` inside a run's artifact root
    async fn log_artifact(
        &self,
        run: &RunInfo,
        artifact_path: &str,
        content: Vec<u8>,
    ) -> TrackingResult<()>;

    /// Create a registered model, succeeding if it already exists
    async fn create_registered_model(&self, name: &str) -> TrackingResult<()>;

    /// Create a new version of a registered model
    async fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: Option<&str>,
    ) -> TrackingResult<ModelVersion>;

    /// Fetch a single model version
    async fn get_model_version(&self, name: &str, version: &str) -> TrackingResult<ModelVersion>;

    /// Search model versions with an MLflow filter string, e.g. `name='m'`
    async fn search_model_versions(&self, filter: &str) -> TrackingResult<Vec<ModelVersion>>;

    /// Move a model version to another registry stage
    async fn transition_model_version_stage(
        &self,
        name: &str,
        version: &str,
        stage: Stage,
        archive_existing_versions: bool,
    ) -> TrackingResult<ModelVersion>;
}

/// Filter string selecting every version of a registered model
#[must_use]
pub fn name_filter(model_name: &str) -> String {
    format!("name='{}'", model_name.replace('\'', "\\'"))
}
