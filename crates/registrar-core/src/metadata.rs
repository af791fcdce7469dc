//! Experiment and registration metadata files
//!
//! Two small JSON documents bracket a registration:
//! - `experiment_info.json` (input): which run holds the model, and where
//! - `registered_model_info.json` (output): what was registered, and its stage

use crate::error::MetadataError;
use registrar_tracking::Stage;
use serde::{Deserialize, Serialize};
use serde_json::ser::{Formatter, PrettyFormatter};
use std::io::{self, Write};
use std::path::Path;

/// Training run that produced the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentInfo {
    /// Tracking run identifier
    pub run_id: String,
    /// Artifact path of the model inside the run
    pub model_path: String,
}

/// Outcome of a registration, persisted for downstream steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredModelInfo {
    /// Registered model name
    pub model_name: String,
    /// Registered version
    pub version: String,
    /// Stage the version was moved to
    pub stage: String,
}

impl RegisteredModelInfo {
    /// Record for a version in the given stage
    #[must_use]
    pub fn new(model_name: impl Into<String>, version: impl Into<String>, stage: Stage) -> Self {
        Self {
            model_name: model_name.into(),
            version: version.into(),
            stage: stage.to_string(),
        }
    }
}

/// Load the model information from a JSON file
///
/// # Errors
/// - `MetadataError::NotFound` if the file does not exist
/// - `MetadataError::Parse` if it is not UTF-8 JSON or lacks `run_id`/`model_path`
/// - `MetadataError::Io` for anything else
pub async fn load_model_info(path: impl AsRef<Path>) -> Result<ExperimentInfo, MetadataError> {
    let path = path.as_ref();

    let raw = tokio::fs::read(path).await.map_err(|e| {
        let err = MetadataError::io_error(path, e);
        match &err {
            MetadataError::NotFound { .. } => {
                tracing::error!("File not found: {}", path.display());
            }
            _ => tracing::error!(
                "Unexpected error occurred while loading model info: {}",
                err
            ),
        }
        err
    })?;

    let info = serde_json::from_slice(&raw).map_err(|source| {
        tracing::error!("Failed to parse JSON file: {}", source);
        MetadataError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;

    tracing::info!("Model info loaded from {}", path.display());
    Ok(info)
}

/// Save the registered model information with stage `Staging`
///
/// # Errors
/// - `MetadataError::Io` if the file or its parent directories cannot be written
pub async fn save_registered_model_info(
    model_name: &str,
    version: &str,
    path: impl AsRef<Path>,
) -> Result<(), MetadataError> {
    save_registered_model_info_with_stage(model_name, version, Stage::Staging, path).await
}

/// Save the registered model information for an explicit stage
///
/// The file is written with a 4-space indent, non-ASCII characters escaped.
///
/// # Errors
/// - `MetadataError::Io` if the file or its parent directories cannot be written
pub async fn save_registered_model_info_with_stage(
    model_name: &str,
    version: &str,
    stage: Stage,
    path: impl AsRef<Path>,
) -> Result<(), MetadataError> {
    let path = path.as_ref();
    let info = RegisteredModelInfo::new(model_name, version, stage);

    write_json(&info, path).await.map_err(|e| {
        tracing::error!(
            "Error occurred while saving registered model info: {}",
            e
        );
        e
    })?;

    tracing::info!("Registered model info saved to {}", path.display());
    Ok(())
}

/// Pretty printer that writes non-ASCII characters as `\uXXXX` escapes
struct AsciiFormatter<'a>(PrettyFormatter<'a>);

impl Formatter for AsciiFormatter<'_> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..i])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

async fn write_json(info: &RegisteredModelInfo, path: &Path) -> Result<(), MetadataError> {
    let mut buf = Vec::new();
    let formatter = AsciiFormatter(PrettyFormatter::with_indent(b"    "));
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    info.serialize(&mut ser).map_err(|e| MetadataError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MetadataError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    tokio::fs::write(path, buf)
        .await
        .map_err(|e| MetadataError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Read back a registration record
///
/// # Errors
/// Same classification as [`load_model_info`].
pub async fn load_registered_model_info(
    path: impl AsRef<Path>,
) -> Result<RegisteredModelInfo, MetadataError> {
    let path = path.as_ref();
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| MetadataError::io_error(path, e))?;
    serde_json::from_slice(&raw).map_err(|source| MetadataError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn loads_experiment_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment_info.json");
        std::fs::write(&path, r#"{"run_id": "abc123", "model_path": "model"}"#).unwrap();

        let info = load_model_info(&path).await.unwrap();
        assert_eq!(
            info,
            ExperimentInfo {
                run_id: "abc123".into(),
                model_path: "model".into(),
            }
        );
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_model_info(dir.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(err, MetadataError::NotFound { .. }));
    }

    #[tokio::test]
    async fn malformed_or_incomplete_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ run_id: ").unwrap();
        assert!(matches!(
            load_model_info(&broken).await.unwrap_err(),
            MetadataError::Parse { .. }
        ));

        let partial = dir.path().join("partial.json");
        std::fs::write(&partial, r#"{"run_id": "abc123"}"#).unwrap();
        assert!(matches!(
            load_model_info(&partial).await.unwrap_err(),
            MetadataError::Parse { .. }
        ));
    }

    #[tokio::test]
    async fn saves_registration_with_four_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("registered_model_info.json");

        save_registered_model_info("sentiment_model", "7", &path)
            .await
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "{\n    \"model_name\": \"sentiment_model\",\n    \"version\": \"7\",\n    \"stage\": \"Staging\"\n}"
        );

        let back = load_registered_model_info(&path).await.unwrap();
        assert_eq!(back, RegisteredModelInfo::new("sentiment_model", "7", Stage::Staging));
    }

    #[tokio::test]
    async fn invalid_utf8_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment_info.json");
        std::fs::write(&path, b"{\"run_id\": \"\xff\xfe\", \"model_path\": \"model\"}").unwrap();

        assert!(matches!(
            load_model_info(&path).await.unwrap_err(),
            MetadataError::Parse { .. }
        ));
    }

    #[tokio::test]
    async fn non_ascii_names_are_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info.json");

        save_registered_model_info("modèle_✓_😀", "1", &path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.is_ascii());
        assert!(written.contains(r#""model_name": "mod\u00e8le_\u2713_\ud83d\ude00""#));

        let back = load_registered_model_info(&path).await.unwrap();
        assert_eq!(back.model_name, "modèle_✓_😀");
    }

    #[tokio::test]
    async fn saves_explicit_stage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info.json");

        save_registered_model_info_with_stage("m", "2", Stage::Production, &path)
            .await
            .unwrap();

        let back = load_registered_model_info(&path).await.unwrap();
        assert_eq!(back.stage, "Production");
    }
}
