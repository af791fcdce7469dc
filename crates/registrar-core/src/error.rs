//! Error types for the registrar
//!
//! Provides error handling for:
//! - Metadata file reads and writes
//! - Configuration loading
//! - The registration flow, including which failures trigger the
//!   register-from-file fallback

use registrar_tracking::TrackingError;
use std::path::PathBuf;

/// Errors reading or writing the JSON metadata files
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// File does not exist
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// File is not valid JSON or lacks required keys
    #[error("failed to parse JSON file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Any other IO failure
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MetadataError {
    /// Classify an IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}

/// Errors loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected schema
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Dotenv file could not be read or parsed
    #[error("invalid dotenv file {}: {source}", path.display())]
    Dotenv {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    /// Neither a tracking URI nor a DagsHub repository is configured
    #[error("no tracking uri configured: set MLFLOW_TRACKING_URI or REPO_OWNER and REPO_NAME")]
    MissingTrackingUri,

    /// A value failed validation
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Tracking client could not be constructed
    #[error("tracking client error: {0}")]
    Client(#[from] TrackingError),
}

/// Errors raised by the registration flow
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// Experiment metadata could not be loaded
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The run does not contain the expected model artifact
    #[error("Model artifact '{path}' not found in run. Available artifacts: {available:?}")]
    ArtifactMissing {
        path: String,
        available: Vec<String>,
    },

    /// The saved model file could not be read
    #[error("cannot read model file {}: {source}", path.display())]
    ModelFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The registry returned no versions for a model just registered
    #[error("No versions found for model '{model_name}'")]
    NoVersions { model_name: String },

    /// The registry gave up registering a version
    #[error("registration of {model_name} version {version} failed on the server")]
    VersionFailed { model_name: String, version: String },

    /// The version did not become ready in time
    #[error("{model_name} version {version} not ready after {attempts} checks")]
    VersionNotReady {
        model_name: String,
        version: String,
        attempts: u32,
    },

    /// Model descriptor could not be rendered
    #[error("failed to build model descriptor: {0}")]
    Descriptor(String),

    /// Tracking service call failed
    #[error("tracking error: {0}")]
    Tracking(#[from] TrackingError),

    /// Configuration problem
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RegistrationError {
    /// Check if the register-from-run failure should fall back to the saved file
    ///
    /// Only a missing or malformed experiment record and a missing run artifact
    /// qualify; tracking and transport failures propagate.
    #[inline]
    #[must_use]
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Self::Metadata(MetadataError::NotFound { .. } | MetadataError::Parse { .. })
                | Self::ArtifactMissing { .. }
        )
    }
}

/// Result alias for registration operations
pub type RegistrationResult<T> = Result<T, RegistrationError>;
