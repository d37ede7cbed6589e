use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use reelflow_types::{ReelflowError, Result};

use crate::engine::{MediaEngine, TranscodeJob};

/// Engine that records jobs instead of running ffmpeg.
///
/// Each job writes an empty file at its output path so downstream steps see
/// real files. Durations are looked up by file name, falling back to
/// `default_duration`.
#[derive(Debug, Default)]
pub struct DryRunEngine {
    jobs: Mutex<Vec<TranscodeJob>>,
    durations: HashMap<String, f64>,
    default_duration: Option<f64>,
    fail_outputs: Vec<String>,
    scratch_files: bool,
}

impl DryRunEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(mut self, file_name: impl Into<String>, secs: f64) -> Self {
        self.durations.insert(file_name.into(), secs);
        self
    }

    pub fn with_default_duration(mut self, secs: f64) -> Self {
        self.default_duration = Some(secs);
        self
    }

    /// Make every job whose output file name contains `needle` fail.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_outputs.push(needle.into());
        self
    }

    /// Leave a `scratch-<n>.tmp` file beside the output of the n-th job.
    pub fn with_scratch_files(mut self) -> Self {
        self.scratch_files = true;
        self
    }

    /// Jobs seen so far, in submission order.
    pub fn jobs(&self) -> Vec<TranscodeJob> {
        self.jobs.lock().clone()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl MediaEngine for DryRunEngine {
    async fn transcode(&self, job: &TranscodeJob) -> Result<PathBuf> {
        let seq = {
            let mut jobs = self.jobs.lock();
            jobs.push(job.clone());
            jobs.len()
        };
        let name = file_name(&job.output);
        if self.fail_outputs.iter().any(|n| name.contains(n.as_str())) {
            return Err(ReelflowError::ToolError {
                tool: "dry-run".into(),
                message: format!("simulated failure for {name}"),
            });
        }
        for input in &job.inputs {
            if !tokio::fs::try_exists(input).await? {
                return Err(ReelflowError::FileNotFound {
                    path: input.clone(),
                });
            }
        }
        if let Some(parent) = job.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&job.output, b"").await?;
        if self.scratch_files {
            let scratch = job.output.with_file_name(format!("scratch-{seq}.tmp"));
            tokio::fs::write(scratch, b"").await?;
        }
        tracing::debug!(output = %job.output.display(), "Dry run job recorded");
        Ok(job.output.clone())
    }

    async fn probe_duration(&self, path: &Path) -> Result<Option<f64>> {
        if !tokio::fs::try_exists(path).await? {
            return Err(ReelflowError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(self
            .durations
            .get(&file_name(path))
            .copied()
            .or(self.default_duration))
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn transcode_touches_output_and_records_job() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"x").unwrap();
        let engine = DryRunEngine::new();

        let out = engine
            .transcode(&TranscodeJob::new(&input, dir.path().join("out/o.mp4")))
            .await
            .unwrap();

        assert!(out.exists());
        assert_eq!(engine.jobs().len(), 1);
    }

    #[tokio::test]
    async fn scratch_files_are_numbered_by_job() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"x").unwrap();
        let engine = DryRunEngine::new().with_scratch_files();

        for name in ["a.mp4", "b.mp4"] {
            engine
                .transcode(&TranscodeJob::new(&input, dir.path().join(name)))
                .await
                .unwrap();
        }

        assert!(dir.path().join("scratch-1.tmp").is_file());
        assert!(dir.path().join("scratch-2.tmp").is_file());
    }

    #[tokio::test]
    async fn transcode_fails_on_missing_input() {
        let dir = TempDir::new().unwrap();
        let engine = DryRunEngine::new();
        let err = engine
            .transcode(&TranscodeJob::new(dir.path().join("gone.mp4"), dir.path().join("o.mp4")))
            .await
            .unwrap_err();
        assert!(matches!(err, ReelflowError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn simulated_failure() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"x").unwrap();
        let engine = DryRunEngine::new().failing_on("bad");
        let err = engine
            .transcode(&TranscodeJob::new(&input, dir.path().join("bad-output.mp4")))
            .await
            .unwrap_err();
        assert!(matches!(err, ReelflowError::ToolError { .. }));
    }

    #[tokio::test]
    async fn probe_uses_table_then_default() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        std::fs::write(&a, b"").unwrap();
        std::fs::write(&b, b"").unwrap();
        let engine = DryRunEngine::new().with_duration("a.mp4", 42.0);

        assert_eq!(engine.probe_duration(&a).await.unwrap(), Some(42.0));
        assert_eq!(engine.probe_duration(&b).await.unwrap(), None);

        let engine = engine.with_default_duration(7.0);
        assert_eq!(engine.probe_duration(&b).await.unwrap(), Some(7.0));
    }

    #[tokio::test]
    async fn probe_of_vanished_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let engine = DryRunEngine::new().with_default_duration(1.0);
        let err = engine
            .probe_duration(&dir.path().join("vanished.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReelflowError::FileNotFound { .. }));
    }
}
