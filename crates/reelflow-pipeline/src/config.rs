//! Run configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reelflow_types::{ReelflowError, Result};
use serde::{Deserialize, Serialize};

/// Directories and limits for a pipeline run. Missing keys take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Per-step working directories are created under this root.
    pub workspace_dir: PathBuf,
    /// Literal inputs and `@resources` read from here.
    pub input_dir: PathBuf,
    /// Archived files are copied here.
    pub output_dir: PathBuf,
    /// Upper bound, in seconds, on a step's input resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_timeout: Option<u64>,
    /// Empty the output directory before the run starts.
    pub clear_output: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("./workspace/"),
            input_dir: PathBuf::from("./resources/input/"),
            output_dir: PathBuf::from("./resources/output/"),
            resolution_timeout: None,
            clear_output: false,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReelflowError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                e.into()
            }
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn resolution_timeout(&self) -> Option<Duration> {
        self.resolution_timeout.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"outputDir": "/tmp/out"}"#).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.input_dir, PathBuf::from("./resources/input/"));
        assert_eq!(config.workspace_dir, PathBuf::from("./workspace/"));
        assert!(!config.clear_output);
        assert_eq!(config.resolution_timeout(), None);
    }

    #[test]
    fn resolution_timeout_in_seconds() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"resolutionTimeout": 90, "clearOutput": true}"#).unwrap();
        assert_eq!(config.resolution_timeout(), Some(Duration::from_secs(90)));
        assert!(config.clear_output);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reelflow.json");
        std::fs::write(&path, r#"{"inputDir": "media"}"#).unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.input_dir, PathBuf::from("media"));

        assert!(matches!(
            PipelineConfig::load(&dir.path().join("missing.json")),
            Err(ReelflowError::FileNotFound { .. })
        ));
    }
}
