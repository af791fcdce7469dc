//! `MLmodel` descriptor for uploaded model files
//!
//! MLflow loads a model directory through the YAML `MLmodel` file at its
//! root. The saved file is uploaded as-is, so the descriptor only has to name
//! it and declare the scikit-learn pickle flavor.

use crate::error::RegistrationError;
use serde::Serialize;
use std::collections::BTreeMap;

/// File name MLflow expects at the root of a model directory
pub const DESCRIPTOR_FILE: &str = "MLmodel";

#[derive(Debug, Serialize)]
struct Descriptor<'a> {
    artifact_path: &'a str,
    flavors: BTreeMap<&'static str, BTreeMap<&'static str, &'a str>>,
    run_id: &'a str,
    utc_time_created: String,
}

/// Render the descriptor for a pickled model inside a run
///
/// # Errors
/// - `RegistrationError::Descriptor` if YAML rendering fails
pub fn render(
    artifact_path: &str,
    model_file_name: &str,
    run_id: &str,
) -> Result<String, RegistrationError> {
    let mut flavors = BTreeMap::new();
    flavors.insert(
        "python_function",
        BTreeMap::from([
            ("loader_module", "mlflow.sklearn"),
            ("model_path", model_file_name),
        ]),
    );
    flavors.insert(
        "sklearn",
        BTreeMap::from([
            ("pickled_model", model_file_name),
            ("serialization_format", "pickle"),
        ]),
    );

    let descriptor = Descriptor {
        artifact_path,
        flavors,
        run_id,
        utc_time_created: chrono::Utc::now()
            .format("%Y-%m-%d %H:%M:%S%.6f")
            .to_string(),
    };

    serde_yaml::to_string(&descriptor).map_err(|e| RegistrationError::Descriptor(e.to_string()))
}
