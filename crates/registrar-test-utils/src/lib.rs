//! Testing utilities for the registrar workspace
//!
//! Shared test helpers, fixtures, and an in-memory tracking service.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use registrar_core::RegistrarConfig;
use registrar_tracking::{
    FileInfo, ModelVersion, ModelVersionStatus, RunInfo, RunStatus, Stage, TrackingClient,
    TrackingError, TrackingResult,
};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Tracking operations, for failure injection and call assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetRun,
    CreateRun,
    UpdateRun,
    ListArtifacts,
    LogArtifact,
    CreateRegisteredModel,
    CreateModelVersion,
    GetModelVersion,
    SearchModelVersions,
    TransitionStage,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub run_id: String,
    pub path: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub name: String,
    pub version: String,
    pub stage: Stage,
    pub archive_existing_versions: bool,
}

#[derive(Debug, Default)]
struct State {
    runs: HashMap<String, RunInfo>,
    artifacts: HashMap<String, Vec<FileInfo>>,
    uploads: Vec<Upload>,
    registered_models: BTreeSet<String>,
    versions: Vec<ModelVersion>,
    transitions: Vec<Transition>,
    failures: HashMap<Op, (u16, String)>,
    pending_checks: u32,
    calls: Vec<Op>,
}

/// In-memory tracking service
///
/// Runs, artifacts and registry state live in a mutex; every call is
/// recorded so tests can assert on the sequence.
#[derive(Debug, Default)]
pub struct FakeTracking {
    state: Mutex<State>,
}

impl FakeTracking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a finished run whose artifacts live in the proxied store
    pub fn with_run(self, run_id: &str) -> Self {
        self.state.lock().runs.insert(
            run_id.to_string(),
            RunInfo {
                run_id: run_id.to_string(),
                experiment_id: "0".to_string(),
                artifact_uri: format!("mlflow-artifacts:/0/{run_id}/artifacts"),
                status: RunStatus::Finished,
            },
        );
        self
    }

    /// Add an artifact file (and its parent directories) to a run
    pub fn with_artifact(self, run_id: &str, path: &str) -> Self {
        self.state.lock().add_artifact(run_id, path, 1);
        self
    }

    /// Pre-existing version of a registered model
    pub fn with_version(self, name: &str, version: &str) -> Self {
        {
            let mut state = self.state.lock();
            state.registered_models.insert(name.to_string());
            state.versions.push(ModelVersion {
                name: name.to_string(),
                version: version.to_string(),
                run_id: None,
                source: None,
                current_stage: Stage::None,
                status: ModelVersionStatus::Ready,
            });
        }
        self
    }

    /// Make every call to `op` fail with an API error
    pub fn fail_on(self, op: Op, status: u16, error_code: &str) -> Self {
        self.state
            .lock()
            .failures
            .insert(op, (status, error_code.to_string()));
        self
    }

    /// New versions report `PENDING_REGISTRATION` for this many status checks
    pub fn with_pending_checks(self, checks: u32) -> Self {
        self.state.lock().pending_checks = checks;
        self
    }

    pub fn calls(&self) -> Vec<Op> {
        self.state.lock().calls.clone()
    }

    pub fn called(&self, op: Op) -> bool {
        self.state.lock().calls.contains(&op)
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state.lock().uploads.clone()
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.state.lock().transitions.clone()
    }

    pub fn versions(&self, name: &str) -> Vec<ModelVersion> {
        self.state
            .lock()
            .versions
            .iter()
            .filter(|v| v.name == name)
            .cloned()
            .collect()
    }

    pub fn run(&self, run_id: &str) -> Option<RunInfo> {
        self.state.lock().runs.get(run_id).cloned()
    }

    pub fn runs(&self) -> Vec<RunInfo> {
        self.state.lock().runs.values().cloned().collect()
    }

    fn enter(&self, op: Op) -> TrackingResult<parking_lot::MutexGuard<'_, State>> {
        let mut state = self.state.lock();
        state.calls.push(op);
        if let Some((status, code)) = state.failures.get(&op) {
            return Err(TrackingError::Api {
                status: *status,
                error_code: code.clone(),
                message: format!("injected failure for {op:?}"),
            });
        }
        Ok(state)
    }
}

impl State {
    fn add_artifact(&mut self, run_id: &str, path: &str, size: i64) {
        let entries = self.artifacts.entry(run_id.to_string()).or_default();
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        for depth in 1..segments.len() {
            let dir = segments[..depth].join("/");
            if !entries.iter().any(|e| e.path == dir) {
                entries.push(FileInfo::dir(dir));
            }
        }
        let file = segments.join("/");
        entries.retain(|e| e.path != file);
        entries.push(FileInfo::file(file, size));
    }

    fn find_version(&mut self, name: &str, version: &str) -> TrackingResult<&mut ModelVersion> {
        self.versions
            .iter_mut()
            .find(|v| v.name == name && v.version == version)
            .ok_or_else(|| {
                TrackingError::NotFound(format!("Model Version (name={name}, version={version})"))
            })
    }
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

#[async_trait]
impl TrackingClient for FakeTracking {
    async fn get_run(&self, run_id: &str) -> TrackingResult<RunInfo> {
        let state = self.enter(Op::GetRun)?;
        state
            .runs
            .get(run_id)
            .cloned()
            .ok_or_else(|| TrackingError::NotFound(format!("Run '{run_id}' not found")))
    }

    async fn create_run(
        &self,
        experiment_id: &str,
        _run_name: Option<&str>,
    ) -> TrackingResult<RunInfo> {
        let mut state = self.enter(Op::CreateRun)?;
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let run = RunInfo {
            run_id: run_id.clone(),
            experiment_id: experiment_id.to_string(),
            artifact_uri: format!("mlflow-artifacts:/{experiment_id}/{run_id}/artifacts"),
            status: RunStatus::Running,
        };
        state.runs.insert(run_id, run.clone());
        Ok(run)
    }

    async fn update_run(&self, run_id: &str, status: RunStatus) -> TrackingResult<()> {
        let mut state = self.enter(Op::UpdateRun)?;
        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| TrackingError::NotFound(format!("Run '{run_id}' not found")))?;
        run.status = status;
        Ok(())
    }

    async fn list_artifacts(
        &self,
        run_id: &str,
        path: Option<&str>,
    ) -> TrackingResult<Vec<FileInfo>> {
        let state = self.enter(Op::ListArtifacts)?;
        if !state.runs.contains_key(run_id) {
            return Err(TrackingError::NotFound(format!("Run '{run_id}' not found")));
        }
        let wanted = path.map(|p| p.trim_matches('/'));
        Ok(state
            .artifacts
            .get(run_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| parent_of(&e.path) == wanted)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn log_artifact(
        &self,
        run: &RunInfo,
        artifact_path: &str,
        content: Vec<u8>,
    ) -> TrackingResult<()> {
        let mut state = self.enter(Op::LogArtifact)?;
        if !state.runs.contains_key(&run.run_id) {
            return Err(TrackingError::NotFound(format!("Run '{}' not found", run.run_id)));
        }
        let size = i64::try_from(content.len()).unwrap_or(i64::MAX);
        state.add_artifact(&run.run_id, artifact_path, size);
        state.uploads.push(Upload {
            run_id: run.run_id.clone(),
            path: artifact_path.to_string(),
            content,
        });
        Ok(())
    }

    async fn create_registered_model(&self, name: &str) -> TrackingResult<()> {
        let mut state = self.enter(Op::CreateRegisteredModel)?;
        state.registered_models.insert(name.to_string());
        Ok(())
    }

    async fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: Option<&str>,
    ) -> TrackingResult<ModelVersion> {
        let mut state = self.enter(Op::CreateModelVersion)?;
        if !state.registered_models.contains(name) {
            return Err(TrackingError::NotFound(format!(
                "Registered Model with name={name} not found"
            )));
        }
        let next = state
            .versions
            .iter()
            .filter(|v| v.name == name)
            .filter_map(ModelVersion::version_number)
            .max()
            .unwrap_or(0)
            + 1;
        let status = if state.pending_checks > 0 {
            ModelVersionStatus::PendingRegistration
        } else {
            ModelVersionStatus::Ready
        };
        let version = ModelVersion {
            name: name.to_string(),
            version: next.to_string(),
            run_id: run_id.map(str::to_string),
            source: Some(source.to_string()),
            current_stage: Stage::None,
            status,
        };
        state.versions.push(version.clone());
        Ok(version)
    }

    async fn get_model_version(&self, name: &str, version: &str) -> TrackingResult<ModelVersion> {
        let mut state = self.enter(Op::GetModelVersion)?;
        if state.pending_checks > 0 {
            state.pending_checks -= 1;
        }
        let ready = state.pending_checks == 0;
        let mv = state.find_version(name, version)?;
        if ready {
            mv.status = ModelVersionStatus::Ready;
        }
        Ok(mv.clone())
    }

    async fn search_model_versions(&self, filter: &str) -> TrackingResult<Vec<ModelVersion>> {
        let state = self.enter(Op::SearchModelVersions)?;
        let name = filter
            .strip_prefix("name='")
            .and_then(|rest| rest.strip_suffix('\''))
            .ok_or_else(|| TrackingError::Api {
                status: 400,
                error_code: "INVALID_PARAMETER_VALUE".to_string(),
                message: format!("unsupported filter: {filter}"),
            })?;
        Ok(state
            .versions
            .iter()
            .filter(|v| v.name == name)
            .cloned()
            .collect())
    }

    async fn transition_model_version_stage(
        &self,
        name: &str,
        version: &str,
        stage: Stage,
        archive_existing_versions: bool,
    ) -> TrackingResult<ModelVersion> {
        let mut state = self.enter(Op::TransitionStage)?;
        if archive_existing_versions {
            for v in state
                .versions
                .iter_mut()
                .filter(|v| v.name == name && v.version != version && v.current_stage == stage)
            {
                v.current_stage = Stage::Archived;
            }
        }
        let mv = state.find_version(name, version)?;
        mv.current_stage = stage;
        let staged = mv.clone();
        state.transitions.push(Transition {
            name: name.to_string(),
            version: version.to_string(),
            stage,
            archive_existing_versions,
        });
        Ok(staged)
    }
}

/// Write `experiment_info.json` under `dir`
pub fn write_experiment_info(dir: &Path, run_id: &str, model_path: &str) -> PathBuf {
    let path = dir.join("reports").join("experiment_info.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let body = serde_json::json!({ "run_id": run_id, "model_path": model_path });
    std::fs::write(&path, serde_json::to_string_pretty(&body).unwrap()).unwrap();
    path
}

/// Write a stand-in pickled model under `dir`
pub fn write_model_file(dir: &Path) -> PathBuf {
    let path = dir.join("models").join("model.pkl");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"\x80\x04\x95fake-pickle").unwrap();
    path
}

/// Config rooted in `dir` with fast readiness polling
pub fn test_config(dir: &Path) -> RegistrarConfig {
    let mut config = RegistrarConfig::new()
        .with_tracking_uri("http://tracking.invalid")
        .with_experiment_info(dir.join("reports").join("experiment_info.json"))
        .with_model_file(dir.join("models").join("model.pkl"))
        .with_registered_model_info(dir.join("reports").join("registered_model_info.json"));
    config.registration.ready_poll_interval_ms = 1;
    config.registration.ready_max_attempts = 5;
    config
}
