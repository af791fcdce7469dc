//! Core types shared by tracking clients
//!
//! These mirror the MLflow REST payloads closely enough to deserialize them
//! directly, while exposing typed stages and statuses to callers.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single entry returned by artifact listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Path relative to the run's artifact root
    pub path: String,
    /// Whether the entry is a directory
    #[serde(default)]
    pub is_dir: bool,
    /// Size in bytes (files only)
    #[serde(default, deserialize_with = "lenient_i64")]
    pub file_size: Option<i64>,
}

impl FileInfo {
    /// File entry
    #[must_use]
    pub fn file(path: impl Into<String>, size: i64) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            file_size: Some(size),
        }
    }

    /// Directory entry
    #[must_use]
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            file_size: None,
        }
    }
}

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    /// Whether the run has reached a terminal state
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Killed)
    }
}

/// Run metadata needed for registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Opaque run identifier
    pub run_id: String,
    /// Owning experiment
    pub experiment_id: String,
    /// Root URI under which the run's artifacts live
    pub artifact_uri: String,
    /// Current status
    pub status: RunStatus,
}

impl RunInfo {
    /// URI of an artifact path inside this run
    #[must_use]
    pub fn artifact_location(&self, artifact_path: &str) -> String {
        let root = self.artifact_uri.trim_end_matches('/');
        let path = artifact_path.trim_matches('/');
        if path.is_empty() {
            root.to_string()
        } else {
            format!("{root}/{path}")
        }
    }
}

/// Registry stage of a model version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Stage {
    #[default]
    None,
    Staging,
    Production,
    Archived,
}

impl Stage {
    /// Name used on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Staging => "Staging",
            Self::Production => "Production",
            Self::Archived => "Archived",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown stage name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model stage '{0}' (expected None, Staging, Production or Archived)")]
pub struct ParseStageError(pub String);

impl FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            "archived" => Ok(Self::Archived),
            _ => Err(ParseStageError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Stage {
    type Error = ParseStageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Stage> for String {
    fn from(stage: Stage) -> Self {
        stage.as_str().to_string()
    }
}

/// Registration status of a model version
///
/// Registries that omit the field only report finished versions, so a
/// missing status reads as `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelVersionStatus {
    PendingRegistration,
    FailedRegistration,
    #[default]
    Ready,
}

/// A registered model version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Registered model name
    pub name: String,
    /// Version number, as the registry reports it
    pub version: String,
    /// Run that produced the version, if any
    #[serde(default)]
    pub run_id: Option<String>,
    /// Artifact location the version was created from
    #[serde(default)]
    pub source: Option<String>,
    /// Current registry stage
    #[serde(default)]
    pub current_stage: Stage,
    /// Registration status
    #[serde(default)]
    pub status: ModelVersionStatus,
}

impl ModelVersion {
    /// Version as an integer, when it is numeric
    #[inline]
    #[must_use]
    pub fn version_number(&self) -> Option<u64> {
        self.version.trim().parse().ok()
    }
}

/// `runs:/<run_id>/<artifact_path>` model URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelUri {
    run_id: String,
    artifact_path: String,
}

impl ModelUri {
    const SCHEME: &'static str = "runs:/";

    /// Build a URI for an artifact inside a run
    #[must_use]
    pub fn from_run(run_id: impl Into<String>, artifact_path: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            artifact_path: artifact_path.into().trim_matches('/').to_string(),
        }
    }

    /// Run identifier
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Artifact path within the run
    #[inline]
    #[must_use]
    pub fn artifact_path(&self) -> &str {
        &self.artifact_path
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", Self::SCHEME, self.run_id, self.artifact_path)
    }
}

/// Malformed model URI
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid model uri '{0}': expected runs:/<run_id>/<path>")]
pub struct ParseModelUriError(pub String);

impl FromStr for ModelUri {
    type Err = ParseModelUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(Self::SCHEME)
            .ok_or_else(|| ParseModelUriError(s.to_string()))?;
        let (run_id, path) = rest
            .trim_start_matches('/')
            .split_once('/')
            .ok_or_else(|| ParseModelUriError(s.to_string()))?;
        if run_id.is_empty() || path.trim_matches('/').is_empty() {
            return Err(ParseModelUriError(s.to_string()));
        }
        Ok(Self::from_run(run_id, path))
    }
}

/// Accepts int64 fields encoded either as JSON numbers or strings
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(i64),
        Str(String),
    }

    match Option::<NumOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrString::Num(n)) => Ok(Some(n)),
        Some(NumOrString::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
