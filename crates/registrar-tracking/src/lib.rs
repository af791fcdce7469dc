//! Registrar Tracking - model tracking service client
//!
//! A typed, async view of the parts of the MLflow tracking API the registrar
//! uses:
//! - Runs: fetch, create, finish
//! - Artifacts: list, upload through the proxied artifact store
//! - Model registry: register, version, search, stage transitions
//!
//! # Example
//!
//! ```rust,ignore
//! use registrar_tracking::{MlflowClient, MlflowConfig, Stage, TrackingClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MlflowClient::new(MlflowConfig::new("http://localhost:5000"))?;
//! let files = client.list_artifacts("0f3c...", None).await?;
//! client
//!     .transition_model_version_stage("sentiment_model", "3", Stage::Staging, false)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod client;
pub mod error;
pub mod mlflow;
pub mod types;

pub use client::{name_filter, TrackingClient};
pub use error::{TrackingError, TrackingResult};
pub use mlflow::{MlflowClient, MlflowConfig};
pub use types::{
    FileInfo, ModelUri, ModelVersion, ModelVersionStatus, ParseModelUriError, ParseStageError,
    RunInfo, RunStatus, Stage,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
