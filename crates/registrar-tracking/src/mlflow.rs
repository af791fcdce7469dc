//! MLflow REST client
//!
//! Talks to the `/api/2.0/mlflow` endpoints of an MLflow tracking server
//! (self-hosted or DagsHub). Artifact uploads go through the server's
//! proxied artifact store (`mlflow-artifacts:` URIs).

use crate::client::TrackingClient;
use crate::error::{TrackingError, TrackingResult};
use crate::types::{FileInfo, ModelVersion, RunInfo, RunStatus, Stage};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

const API_PREFIX: &str = "api/2.0/mlflow";
const ARTIFACTS_PREFIX: &str = "api/2.0/mlflow-artifacts/artifacts";
const PROXIED_SCHEME: &str = "mlflow-artifacts:";
const SEARCH_PAGE_SIZE: u32 = 200;

/// Connection settings for [`MlflowClient`]
#[derive(Clone, Default)]
pub struct MlflowConfig {
    /// Tracking server base URI, e.g. `https://dagshub.com/owner/repo.mlflow`
    pub uri: String,
    /// Basic auth user
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Bearer token, used when basic auth is not configured
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries for transport errors, 429 and 5xx responses
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further attempt
    pub retry_backoff: Duration,
}

impl MlflowConfig {
    /// Config for a server URI with default timeouts
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for MlflowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlflowConfig")
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .field("has_token", &self.token.is_some())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[derive(Clone)]
enum Auth {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

/// HTTP client for the MLflow REST API
pub struct MlflowClient {
    base: String,
    auth: Auth,
    client: reqwest::Client,
    max_retries: u32,
    retry_backoff: Duration,
}

impl MlflowClient {
    /// Build a client from connection settings
    ///
    /// # Errors
    /// - `TrackingError::Config` if the URI is empty or the HTTP client cannot be built
    pub fn new(config: MlflowConfig) -> TrackingResult<Self> {
        let base = config.uri.trim().trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(TrackingError::Config("tracking uri is empty".to_string()));
        }

        let auth = match (config.username, config.password, config.token) {
            (Some(username), Some(password), _) => Auth::Basic { username, password },
            (_, _, Some(token)) => Auth::Bearer(token),
            _ => Auth::None,
        };

        let client = reqwest::Client::builder()
            .user_agent(concat!("registrar/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| TrackingError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base,
            auth,
            client,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    /// Tracking server base URI
    #[inline]
    #[must_use]
    pub fn base_uri(&self) -> &str {
        &self.base
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{API_PREFIX}/{endpoint}", self.base)
    }

    /// Upload URL for a proxied artifact
    ///
    /// `mlflow-artifacts:/0/<run>/artifacts` and
    /// `mlflow-artifacts://host/0/<run>/artifacts` both resolve against this
    /// client's server.
    fn artifact_url(&self, artifact_uri: &str, artifact_path: &str) -> TrackingResult<String> {
        let rest = artifact_uri
            .strip_prefix(PROXIED_SCHEME)
            .ok_or_else(|| TrackingError::UnsupportedArtifactStore(artifact_uri.to_string()))?;
        let rest = match rest.strip_prefix("//") {
            Some(with_authority) => with_authority
                .split_once('/')
                .map_or("", |(_, path)| path),
            None => rest,
        };
        let root = rest.trim_matches('/');
        let path = artifact_path.trim_matches('/');
        Ok(format!("{}/{ARTIFACTS_PREFIX}/{root}/{path}", self.base))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::None => request,
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Bearer(token) => request.bearer_auth(token),
        }
    }

    /// Send a request, retrying transient failures with exponential backoff
    async fn execute<F>(&self, endpoint: &str, make: F) -> TrackingResult<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match self.authorize(make()).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => api_error(response).await,
                Err(e) => TrackingError::Http {
                    message: format!("{endpoint} request failed: {e}"),
                },
            };

            if attempt >= self.max_retries || !err.is_retryable() {
                return Err(err);
            }

            let delay = self.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
            tracing::warn!(
                endpoint,
                attempt = attempt + 1,
                error = %err,
                "retrying tracking request in {:?}",
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> TrackingResult<T> {
        let url = self.api_url(endpoint);
        let response = self
            .execute(endpoint, || self.client.get(&url).query(query))
            .await?;
        decode(endpoint, response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> TrackingResult<T> {
        let url = self.api_url(endpoint);
        let response = self
            .execute(endpoint, || self.client.post(&url).json(body))
            .await?;
        decode(endpoint, response).await
    }
}

impl std::fmt::Debug for MlflowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth = match self.auth {
            Auth::None => "none",
            Auth::Basic { .. } => "basic",
            Auth::Bearer(_) => "bearer",
        };
        f.debug_struct("MlflowClient")
            .field("base", &self.base)
            .field("auth", &auth)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

async fn api_error(response: Response) -> TrackingError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(e) if e.error_code == TrackingError::RESOURCE_DOES_NOT_EXIST => {
            TrackingError::NotFound(e.message)
        }
        Ok(e) if !e.error_code.is_empty() => TrackingError::Api {
            status: status.as_u16(),
            error_code: e.error_code,
            message: e.message,
        },
        _ if status == reqwest::StatusCode::NOT_FOUND => TrackingError::NotFound(body),
        _ => TrackingError::Api {
            status: status.as_u16(),
            error_code: format!("HTTP_{}", status.as_u16()),
            message: body,
        },
    }
}

async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> TrackingResult<T> {
    let body = response
        .text()
        .await
        .map_err(|e| TrackingError::invalid_response(endpoint, e.to_string()))?;
    let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
    serde_json::from_str(body).map_err(|e| TrackingError::invalid_response(endpoint, e.to_string()))
}

#[derive(Deserialize)]
struct RunEnvelope {
    run: RunBody,
}

#[derive(Deserialize)]
struct RunBody {
    info: RunInfo,
}

#[derive(Deserialize)]
struct ListArtifactsResponse {
    #[serde(default)]
    files: Vec<FileInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ModelVersionEnvelope {
    model_version: ModelVersion,
}

#[derive(Deserialize)]
struct SearchModelVersionsResponse {
    #[serde(default)]
    model_versions: Vec<ModelVersion>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct Ignored {}

/// Next page to request, or `None` when done
///
/// A token the server already handed out ends the listing.
fn next_token(
    endpoint: &str,
    token: Option<String>,
    seen: &mut HashSet<String>,
) -> Option<String> {
    let token = token.filter(|t| !t.is_empty())?;
    if seen.insert(token.clone()) {
        Some(token)
    } else {
        tracing::warn!(endpoint, token = %token, "page token repeated, stopping pagination");
        None
    }
}

#[async_trait]
impl TrackingClient for MlflowClient {
    async fn get_run(&self, run_id: &str) -> TrackingResult<RunInfo> {
        let envelope: RunEnvelope = self
            .get_json("runs/get", &[("run_id", run_id.to_string())])
            .await?;
        Ok(envelope.run.info)
    }

    async fn create_run(
        &self,
        experiment_id: &str,
        run_name: Option<&str>,
    ) -> TrackingResult<RunInfo> {
        let mut body = json!({
            "experiment_id": experiment_id,
            "start_time": chrono::Utc::now().timestamp_millis(),
        });
        if let Some(name) = run_name {
            body["run_name"] = json!(name);
        }
        let envelope: RunEnvelope = self.post_json("runs/create", &body).await?;
        tracing::debug!(run_id = %envelope.run.info.run_id, "created run");
        Ok(envelope.run.info)
    }

    async fn update_run(&self, run_id: &str, status: RunStatus) -> TrackingResult<()> {
        let mut body = json!({ "run_id": run_id, "status": status });
        if status.is_terminal() {
            body["end_time"] = json!(chrono::Utc::now().timestamp_millis());
        }
        let _: Ignored = self.post_json("runs/update", &body).await?;
        Ok(())
    }

    async fn list_artifacts(
        &self,
        run_id: &str,
        path: Option<&str>,
    ) -> TrackingResult<Vec<FileInfo>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let mut query = vec![("run_id", run_id.to_string())];
            if let Some(path) = path {
                query.push(("path", path.to_string()));
            }
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let page: ListArtifactsResponse = self.get_json("artifacts/list", &query).await?;
            files.extend(page.files);

            match next_token("artifacts/list", page.next_page_token, &mut seen) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(files)
    }

    async fn log_artifact(
        &self,
        run: &RunInfo,
        artifact_path: &str,
        content: Vec<u8>,
    ) -> TrackingResult<()> {
        let url = self.artifact_url(&run.artifact_uri, artifact_path)?;
        let size = content.len();
        self.execute("mlflow-artifacts/upload", || {
            self.client
                .put(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(content.clone())
        })
        .await?;
        tracing::debug!(run_id = %run.run_id, artifact_path, size, "uploaded artifact");
        Ok(())
    }

    async fn create_registered_model(&self, name: &str) -> TrackingResult<()> {
        let body = json!({ "name": name });
        match self
            .post_json::<Ignored>("registered-models/create", &body)
            .await
        {
            Ok(_) => {
                tracing::info!(model = name, "created registered model");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                tracing::debug!(model = name, "registered model already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: Option<&str>,
    ) -> TrackingResult<ModelVersion> {
        let mut body = json!({ "name": name, "source": source });
        if let Some(run_id) = run_id {
            body["run_id"] = json!(run_id);
        }
        let envelope: ModelVersionEnvelope =
            self.post_json("model-versions/create", &body).await?;
        Ok(envelope.model_version)
    }

    async fn get_model_version(&self, name: &str, version: &str) -> TrackingResult<ModelVersion> {
        let envelope: ModelVersionEnvelope = self
            .get_json(
                "model-versions/get",
                &[("name", name.to_string()), ("version", version.to_string())],
            )
            .await?;
        Ok(envelope.model_version)
    }

    async fn search_model_versions(&self, filter: &str) -> TrackingResult<Vec<ModelVersion>> {
        let mut versions = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let mut query = vec![
                ("filter", filter.to_string()),
                ("max_results", SEARCH_PAGE_SIZE.to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let page: SearchModelVersionsResponse =
                self.get_json("model-versions/search", &query).await?;
            versions.extend(page.model_versions);

            match next_token("model-versions/search", page.next_page_token, &mut seen) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(versions)
    }

    async fn transition_model_version_stage(
        &self,
        name: &str,
        version: &str,
        stage: Stage,
        archive_existing_versions: bool,
    ) -> TrackingResult<ModelVersion> {
        let body = json!({
            "name": name,
            "version": version,
            "stage": stage,
            "archive_existing_versions": archive_existing_versions,
        });
        let envelope: ModelVersionEnvelope = self
            .post_json("model-versions/transition-stage", &body)
            .await?;
        Ok(envelope.model_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(uri: &str) -> MlflowClient {
        MlflowClient::new(MlflowConfig::new(uri)).unwrap()
    }

    #[test]
    fn empty_uri_is_rejected() {
        let err = MlflowClient::new(MlflowConfig::new("  ")).unwrap_err();
        assert!(matches!(err, TrackingError::Config(_)));
    }

    #[test]
    fn base_uri_trims_trailing_slash() {
        let c = client("https://dagshub.com/owner/repo.mlflow/");
        assert_eq!(c.base_uri(), "https://dagshub.com/owner/repo.mlflow");
        assert_eq!(
            c.api_url("runs/get"),
            "https://dagshub.com/owner/repo.mlflow/api/2.0/mlflow/runs/get"
        );
    }

    #[test]
    fn proxied_artifact_urls() {
        let c = client("http://localhost:5000");
        assert_eq!(
            c.artifact_url("mlflow-artifacts:/0/abc/artifacts", "model/model.pkl")
                .unwrap(),
            "http://localhost:5000/api/2.0/mlflow-artifacts/artifacts/0/abc/artifacts/model/model.pkl"
        );
        assert_eq!(
            c.artifact_url("mlflow-artifacts://other:5000/0/abc/artifacts/", "/MLmodel")
                .unwrap(),
            "http://localhost:5000/api/2.0/mlflow-artifacts/artifacts/0/abc/artifacts/MLmodel"
        );
    }

    #[test]
    fn non_proxied_artifact_store_is_unsupported() {
        let c = client("http://localhost:5000");
        let err = c.artifact_url("s3://bucket/0/abc/artifacts", "model").unwrap_err();
        assert!(matches!(err, TrackingError::UnsupportedArtifactStore(_)));
    }

    #[test]
    fn auth_selection_prefers_basic() {
        let mut config = MlflowConfig::new("http://localhost:5000");
        config.username = Some("owner".into());
        config.password = Some("secret".into());
        config.token = Some("tok".into());
        let c = MlflowClient::new(config).unwrap();
        assert!(matches!(c.auth, Auth::Basic { .. }));
        assert!(!format!("{c:?}").contains("secret"));
    }

    #[test]
    fn page_tokens_stop_on_empty_or_repeat() {
        let mut seen = HashSet::new();
        assert_eq!(next_token("e", Some("a".into()), &mut seen).as_deref(), Some("a"));
        assert_eq!(next_token("e", Some("b".into()), &mut seen).as_deref(), Some("b"));
        assert_eq!(next_token("e", Some("a".into()), &mut seen), None);
        assert_eq!(next_token("e", Some(String::new()), &mut seen), None);
        assert_eq!(next_token("e", None, &mut seen), None);
    }
}
