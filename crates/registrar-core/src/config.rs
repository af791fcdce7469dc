//! Registrar configuration
//!
//! Settings come from an optional TOML file, then environment variables
//! override them. Variables missing from the process environment are taken
//! from a `.env` file. The names match the ones MLflow and DagsHub tooling
//! already use.

use crate::error::ConfigError;
use registrar_tracking::{MlflowClient, MlflowConfig, Stage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Dotenv file looked up from the working directory upwards
pub const DOTENV_FILE: &str = ".env";

/// Read the variables of a dotenv file
///
/// # Errors
/// - `ConfigError::Dotenv` if the file is missing or malformed
pub fn read_env_file(path: impl AsRef<Path>) -> Result<HashMap<String, String>, ConfigError> {
    let path = path.as_ref();
    let iter = dotenvy::from_path_iter(path).map_err(|source| ConfigError::Dotenv {
        path: path.to_path_buf(),
        source,
    })?;
    collect_env(path, iter)
}

/// Variables of the nearest `.env`, or none when there is no such file
fn discover_env_file() -> Result<HashMap<String, String>, ConfigError> {
    match dotenvy::dotenv_iter() {
        Ok(iter) => collect_env(Path::new(DOTENV_FILE), iter),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(source) => Err(ConfigError::Dotenv {
            path: PathBuf::from(DOTENV_FILE),
            source,
        }),
    }
}

fn collect_env<I>(path: &Path, iter: I) -> Result<HashMap<String, String>, ConfigError>
where
    I: Iterator<Item = dotenvy::Result<(String, String)>>,
{
    let vars = iter
        .collect::<dotenvy::Result<HashMap<_, _>>>()
        .map_err(|source| ConfigError::Dotenv {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(path = %path.display(), count = vars.len(), "loaded dotenv variables");
    Ok(vars)
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    /// Registered model name
    pub model_name: String,
    /// Stage new versions are moved to
    pub target_stage: Stage,
    /// Archive versions already in the target stage
    pub archive_existing_versions: bool,
    /// Experiment used for runs created by the file fallback
    pub experiment_id: String,
    /// Artifact directory the fallback uploads the model into
    pub artifact_path: String,
    /// Tracking server connection
    pub tracking: TrackingSettings,
    /// DagsHub-hosted tracking
    pub dagshub: DagsHubSettings,
    /// Input and output files
    pub paths: PathSettings,
    /// Version readiness polling
    pub registration: RegistrationSettings,
}

impl RegistrarConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With model name
    #[inline]
    #[must_use]
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// With target stage
    #[inline]
    #[must_use]
    pub fn with_target_stage(mut self, stage: Stage) -> Self {
        self.target_stage = stage;
        self
    }

    /// With tracking URI
    #[inline]
    #[must_use]
    pub fn with_tracking_uri(mut self, uri: impl Into<String>) -> Self {
        self.tracking.uri = Some(uri.into());
        self
    }

    /// With experiment info input path
    #[inline]
    #[must_use]
    pub fn with_experiment_info(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.experiment_info = path.into();
        self
    }

    /// With fallback model file path
    #[inline]
    #[must_use]
    pub fn with_model_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.model_file = path.into();
        self
    }

    /// With registration record output path
    #[inline]
    #[must_use]
    pub fn with_registered_model_info(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.registered_model_info = path.into();
        self
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` if it is not valid TOML for this schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the optional file, then apply environment overrides
    ///
    /// The nearest `.env` supplies variables the process environment lacks.
    ///
    /// # Errors
    /// Propagates file errors and invalid environment values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env_file(path, None)
    }

    /// Like [`load`](Self::load), with an explicit dotenv file
    ///
    /// # Errors
    /// - `ConfigError::Dotenv` if an explicit `env_file` cannot be read
    /// - anything [`from_file`](Self::from_file) or [`apply_env`](Self::apply_env) returns
    pub fn load_with_env_file(
        path: Option<&Path>,
        env_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let dotenv = match env_file {
            Some(env_file) => read_env_file(env_file)?,
            None => discover_env_file()?,
        };
        base.apply_env(|key| std::env::var(key).ok().or_else(|| dotenv.get(key).cloned()))
    }

    /// Override settings from environment-style lookups
    ///
    /// | variable | setting |
    /// |---|---|
    /// | `MLFLOW_TRACKING_URI` | `tracking.uri` |
    /// | `MLFLOW_TRACKING_USERNAME` | `tracking.username` |
    /// | `MLFLOW_TRACKING_PASSWORD` | `tracking.password` |
    /// | `MLFLOW_TRACKING_TOKEN` | `tracking.token` |
    /// | `DAGSHUB_USER_TOKEN` | `dagshub.token` |
    /// | `REPO_OWNER` | `dagshub.repo_owner` |
    /// | `REPO_NAME` | `dagshub.repo_name` |
    /// | `REGISTRAR_MODEL_NAME` | `model_name` |
    /// | `REGISTRAR_TARGET_STAGE` | `target_stage` |
    ///
    /// # Errors
    /// - `ConfigError::InvalidValue` for an unknown stage name
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MLFLOW_TRACKING_URI") {
            self.tracking.uri = Some(v);
        }
        if let Some(v) = get("MLFLOW_TRACKING_USERNAME") {
            self.tracking.username = Some(v);
        }
        if let Some(v) = get("MLFLOW_TRACKING_PASSWORD") {
            self.tracking.password = Some(v);
        }
        if let Some(v) = get("MLFLOW_TRACKING_TOKEN") {
            self.tracking.token = Some(v);
        }
        if let Some(v) = get("DAGSHUB_USER_TOKEN") {
            self.dagshub.token = Some(v);
        }
        if let Some(v) = get("REPO_OWNER") {
            self.dagshub.repo_owner = Some(v);
        }
        if let Some(v) = get("REPO_NAME") {
            self.dagshub.repo_name = Some(v);
        }
        if let Some(v) = get("REGISTRAR_MODEL_NAME") {
            self.model_name = v;
        }
        if let Some(v) = get("REGISTRAR_TARGET_STAGE") {
            self.target_stage = v.parse().map_err(|e: registrar_tracking::ParseStageError| {
                ConfigError::InvalidValue {
                    key: "REGISTRAR_TARGET_STAGE".to_string(),
                    message: e.to_string(),
                }
            })?;
        }

        Ok(self)
    }

    /// Effective tracking URI
    ///
    /// An explicit URI wins; otherwise a DagsHub repository maps to its
    /// hosted MLflow endpoint.
    #[must_use]
    pub fn tracking_uri(&self) -> Option<String> {
        if let Some(uri) = self.tracking.uri.as_ref().filter(|u| !u.trim().is_empty()) {
            return Some(uri.clone());
        }
        match (&self.dagshub.repo_owner, &self.dagshub.repo_name) {
            (Some(owner), Some(name)) => Some(format!("https://dagshub.com/{owner}/{name}.mlflow")),
            _ => None,
        }
    }

    /// Connection settings for the MLflow client
    ///
    /// Explicit MLflow credentials take precedence. A DagsHub token is sent
    /// as basic auth for the repository owner, or as a bearer token when no
    /// owner is known.
    ///
    /// # Errors
    /// - `ConfigError::MissingTrackingUri` when no URI can be determined
    pub fn mlflow_config(&self) -> Result<MlflowConfig, ConfigError> {
        let uri = self.tracking_uri().ok_or(ConfigError::MissingTrackingUri)?;
        let mut config = MlflowConfig::new(uri);
        config.timeout = Duration::from_secs(self.tracking.timeout_secs);
        config.max_retries = self.tracking.max_retries;
        config.retry_backoff = Duration::from_millis(self.tracking.retry_backoff_ms);

        config.username = self.tracking.username.clone();
        config.password = self.tracking.password.clone();
        config.token = self.tracking.token.clone();

        if config.password.is_none() && config.token.is_none() {
            if let Some(token) = &self.dagshub.token {
                match &self.dagshub.repo_owner {
                    Some(owner) => {
                        config.username.get_or_insert_with(|| owner.clone());
                        config.password = Some(token.clone());
                    }
                    None => config.token = Some(token.clone()),
                }
            }
        }

        Ok(config)
    }

    /// Build an MLflow client from these settings
    ///
    /// # Errors
    /// - `ConfigError::MissingTrackingUri` when no URI can be determined
    /// - `ConfigError::Client` if the HTTP client cannot be built
    pub fn connect(&self) -> Result<MlflowClient, ConfigError> {
        let config = self.mlflow_config()?;
        tracing::info!(uri = %config.uri, "connecting to tracking server");
        Ok(MlflowClient::new(config)?)
    }
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            model_name: "sentiment_model".to_string(),
            target_stage: Stage::Staging,
            archive_existing_versions: false,
            experiment_id: "0".to_string(),
            artifact_path: "model".to_string(),
            tracking: TrackingSettings::default(),
            dagshub: DagsHubSettings::default(),
            paths: PathSettings::default(),
            registration: RegistrationSettings::default(),
        }
    }
}

/// Tracking server connection settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    /// Server base URI
    pub uri: Option<String>,
    /// Basic auth user
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Bearer token
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Retries for transient failures
    pub max_retries: u32,
    /// First retry delay in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            uri: None,
            username: None,
            password: None,
            token: None,
            timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl std::fmt::Debug for TrackingSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingSettings")
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .field("has_token", &self.token.is_some())
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// DagsHub repository hosting the tracking server
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DagsHubSettings {
    /// Repository owner
    pub repo_owner: Option<String>,
    /// Repository name
    pub repo_name: Option<String>,
    /// User token
    pub token: Option<String>,
}

impl std::fmt::Debug for DagsHubSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagsHubSettings")
            .field("repo_owner", &self.repo_owner)
            .field("repo_name", &self.repo_name)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

/// File locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Experiment record written by training
    pub experiment_info: PathBuf,
    /// Saved model used by the fallback
    pub model_file: PathBuf,
    /// Registration record written on success
    pub registered_model_info: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            experiment_info: PathBuf::from("reports/experiment_info.json"),
            model_file: PathBuf::from("./models/model.pkl"),
            registered_model_info: PathBuf::from("reports/registered_model_info.json"),
        }
    }
}

/// Polling for a new version to leave `PENDING_REGISTRATION`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSettings {
    /// Delay between status checks, in milliseconds
    pub ready_poll_interval_ms: u64,
    /// Status checks before giving up
    pub ready_max_attempts: u32,
}

impl RegistrationSettings {
    /// Poll interval as a duration
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            ready_poll_interval_ms: 500,
            ready_max_attempts: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_pipeline_layout() {
        let config = RegistrarConfig::new();
        assert_eq!(config.model_name, "sentiment_model");
        assert_eq!(config.target_stage, Stage::Staging);
        assert!(!config.archive_existing_versions);
        assert_eq!(
            config.paths.experiment_info,
            PathBuf::from("reports/experiment_info.json")
        );
        assert_eq!(config.paths.model_file, PathBuf::from("./models/model.pkl"));
        assert!(config.tracking_uri().is_none());
    }

    #[test]
    fn dagshub_repo_derives_tracking_uri() {
        let config = RegistrarConfig::new()
            .apply_env(env(&[("REPO_OWNER", "alice"), ("REPO_NAME", "sentiment")]))
            .unwrap();
        assert_eq!(
            config.tracking_uri().as_deref(),
            Some("https://dagshub.com/alice/sentiment.mlflow")
        );
    }

    #[test]
    fn explicit_uri_wins_over_dagshub() {
        let config = RegistrarConfig::new()
            .apply_env(env(&[
                ("MLFLOW_TRACKING_URI", "http://mlflow:5000"),
                ("REPO_OWNER", "alice"),
                ("REPO_NAME", "sentiment"),
            ]))
            .unwrap();
        assert_eq!(config.tracking_uri().as_deref(), Some("http://mlflow:5000"));
    }

    #[test]
    fn dagshub_token_becomes_basic_auth() {
        let config = RegistrarConfig::new()
            .apply_env(env(&[
                ("REPO_OWNER", "alice"),
                ("REPO_NAME", "sentiment"),
                ("DAGSHUB_USER_TOKEN", "tok"),
            ]))
            .unwrap();
        let mlflow = config.mlflow_config().unwrap();
        assert_eq!(mlflow.username.as_deref(), Some("alice"));
        assert_eq!(mlflow.password.as_deref(), Some("tok"));
        assert!(mlflow.token.is_none());
    }

    #[test]
    fn dagshub_token_without_owner_is_bearer() {
        let config = RegistrarConfig::new()
            .apply_env(env(&[
                ("MLFLOW_TRACKING_URI", "https://dagshub.com/alice/sentiment.mlflow"),
                ("DAGSHUB_USER_TOKEN", "tok"),
            ]))
            .unwrap();
        let mlflow = config.mlflow_config().unwrap();
        assert_eq!(mlflow.token.as_deref(), Some("tok"));
        assert!(mlflow.username.is_none());
        assert!(mlflow.password.is_none());
    }

    #[test]
    fn mlflow_token_wins_over_dagshub_token() {
        let config = RegistrarConfig::new()
            .apply_env(env(&[
                ("REPO_OWNER", "alice"),
                ("REPO_NAME", "sentiment"),
                ("DAGSHUB_USER_TOKEN", "dagshub-tok"),
                ("MLFLOW_TRACKING_TOKEN", "mlflow-tok"),
            ]))
            .unwrap();
        let mlflow = config.mlflow_config().unwrap();
        assert_eq!(mlflow.token.as_deref(), Some("mlflow-tok"));
        assert!(mlflow.username.is_none());
        assert!(mlflow.password.is_none());
    }

    #[test]
    fn env_file_derives_dagshub_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# DagsHub repository\nREPO_OWNER=alice\nREPO_NAME=\"sentiment\"\nDAGSHUB_USER_TOKEN=tok\n",
        )
        .unwrap();

        let vars = read_env_file(&path).unwrap();
        let config = RegistrarConfig::new()
            .apply_env(|key| vars.get(key).cloned())
            .unwrap();
        assert_eq!(
            config.tracking_uri().as_deref(),
            Some("https://dagshub.com/alice/sentiment.mlflow")
        );
        assert_eq!(config.dagshub.token.as_deref(), Some("tok"));
    }

    #[test]
    fn explicit_env_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(".env");
        let err = RegistrarConfig::load_with_env_file(None, Some(missing.as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::Dotenv { .. }));
    }

    #[test]
    fn missing_uri_is_reported() {
        let err = RegistrarConfig::new().mlflow_config().unwrap_err();
        assert!(matches!(err, ConfigError::MissingTrackingUri));
    }

    #[test]
    fn invalid_stage_in_env_is_rejected() {
        let err = RegistrarConfig::new()
            .apply_env(env(&[("REGISTRAR_TARGET_STAGE", "qa")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrar.toml");
        std::fs::write(
            &path,
            r#"
model_name = "churn_model"
target_stage = "production"

[tracking]
uri = "http://localhost:5000"
max_retries = 1

[paths]
model_file = "artifacts/churn.pkl"
"#,
        )
        .unwrap();

        let config = RegistrarConfig::from_file(&path).unwrap();
        assert_eq!(config.model_name, "churn_model");
        assert_eq!(config.target_stage, Stage::Production);
        assert_eq!(config.tracking.max_retries, 1);
        assert_eq!(config.tracking.timeout_secs, 30);
        assert_eq!(config.paths.model_file, PathBuf::from("artifacts/churn.pkl"));
        assert_eq!(
            config.paths.experiment_info,
            PathBuf::from("reports/experiment_info.json")
        );
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrar.toml");
        std::fs::write(&path, "model_name = [").unwrap();
        assert!(matches!(
            RegistrarConfig::from_file(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }
}
