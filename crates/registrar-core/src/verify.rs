//! Run artifact checks
//!
//! Registration from a run only makes sense if the model artifact is really
//! there. These helpers list what a run holds, either as a plain path list
//! for the registration check or as a small report for humans.

use registrar_tracking::{FileInfo, TrackingClient, TrackingResult};
use std::fmt;

/// List artifact paths at the root of a run
///
/// Never fails: a listing error is logged and reported as no artifacts, so
/// the caller's "artifact missing" path handles it.
pub async fn verify_run_artifacts(client: &dyn TrackingClient, run_id: &str) -> Vec<String> {
    match client.list_artifacts(run_id, None).await {
        Ok(files) => {
            let paths: Vec<String> = files.into_iter().map(|f| f.path).collect();
            tracing::info!("Found artifacts in run {}: {:?}", run_id, paths);
            paths
        }
        Err(e) => {
            tracing::error!("Error listing artifacts: {}", e);
            Vec::new()
        }
    }
}

/// One top-level artifact and, for directories, its direct children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    /// The top-level entry
    pub info: FileInfo,
    /// Direct children (empty for files)
    pub children: Vec<FileInfo>,
}

/// Artifact layout of a run plus hints for fixing a bad `model_path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReport {
    /// Inspected run
    pub run_id: String,
    /// Top-level entries
    pub entries: Vec<ArtifactEntry>,
    /// Suggested fixes when registration cannot find the model
    pub suggestions: Vec<String>,
}

impl ArtifactReport {
    /// Whether the run has any artifacts
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a top-level artifact with this path exists
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.info.path == path)
    }
}

impl fmt::Display for ArtifactReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Available artifacts in run {}:", self.run_id)?;
        writeln!(f, "{}", "-".repeat(50))?;
        if self.entries.is_empty() {
            writeln!(f, "No artifacts found!")?;
        }
        for entry in &self.entries {
            writeln!(f, "  - {} (is_dir: {})", entry.info.path, entry.info.is_dir)?;
            for child in &entry.children {
                writeln!(f, "    - {}", child.path)?;
            }
        }
        writeln!(f)?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f)?;
        writeln!(f, "Suggested fixes:")?;
        for (i, suggestion) in self.suggestions.iter().enumerate() {
            writeln!(f, "{}. {}", i + 1, suggestion)?;
        }
        Ok(())
    }
}

/// Fixed hints shown after an artifact listing
#[must_use]
pub fn default_suggestions() -> Vec<String> {
    vec![
        "Check if the model was logged with a different artifact_path".to_string(),
        "Update 'model_path' in experiment_info.json to match the actual artifact path".to_string(),
        "Re-run your training script to ensure the model is logged correctly".to_string(),
    ]
}

/// List a run's artifacts one level deep
///
/// # Errors
/// Propagates any listing failure.
pub async fn inspect_run_artifacts(
    client: &dyn TrackingClient,
    run_id: &str,
) -> TrackingResult<ArtifactReport> {
    let top = client.list_artifacts(run_id, None).await?;
    let mut entries = Vec::with_capacity(top.len());

    for info in top {
        let children = if info.is_dir {
            client.list_artifacts(run_id, Some(&info.path)).await?
        } else {
            Vec::new()
        };
        entries.push(ArtifactEntry { info, children });
    }

    tracing::debug!(run_id, entries = entries.len(), "inspected run artifacts");

    Ok(ArtifactReport {
        run_id: run_id.to_string(),
        entries,
        suggestions: default_suggestions(),
    })
}
