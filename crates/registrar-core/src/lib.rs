//! Registrar Core - model registration flow
//!
//! Takes a trained model from a tracking run (or a saved file) into the model
//! registry:
//! - Reads `experiment_info.json` written by training
//! - Checks the run really holds the model artifact
//! - Registers a new model version and moves it to a stage
//! - Falls back to uploading the saved model file when the run is unusable
//! - Writes `registered_model_info.json` for downstream steps
//!
//! # Example
//!
//! ```rust,ignore
//! use registrar_core::{Registrar, RegistrarConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RegistrarConfig::load(None)?;
//! let client = Arc::new(config.connect()?);
//! let registrar = Registrar::new(client, config);
//!
//! let outcome = registrar.register().await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod descriptor;
pub mod error;
pub mod metadata;
pub mod register;
pub mod verify;

pub use config::{
    read_env_file, DagsHubSettings, PathSettings, RegistrarConfig, RegistrationSettings,
    TrackingSettings, DOTENV_FILE,
};
pub use error::{ConfigError, MetadataError, RegistrationError, RegistrationResult};
pub use metadata::{
    load_model_info, load_registered_model_info, save_registered_model_info,
    save_registered_model_info_with_stage, ExperimentInfo, RegisteredModelInfo,
};
pub use register::{Registrar, RegistrationOrigin, RegistrationOutcome};
pub use verify::{inspect_run_artifacts, verify_run_artifacts, ArtifactEntry, ArtifactReport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the registrar
    pub use crate::{
        ExperimentInfo, RegisteredModelInfo, Registrar, RegistrarConfig, RegistrationError,
        RegistrationOutcome,
    };
    pub use registrar_tracking::{Stage, TrackingClient};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
