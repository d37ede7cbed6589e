//! The external media engine contract and its ffmpeg implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reelflow_types::{ReelflowError, Result};
use serde::Deserialize;

use crate::command::{ToolCommand, DEFAULT_TIMEOUT};

// ---------------------------------------------------------------------------
// TranscodeJob
// ---------------------------------------------------------------------------

/// One ffmpeg invocation: inputs, options, filters, and a single output file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscodeJob {
    pub inputs: Vec<PathBuf>,
    /// Options placed before the first `-i` (seeking, duration).
    pub input_options: Vec<String>,
    pub video_filters: Vec<String>,
    pub audio_filters: Vec<String>,
    pub output_options: Vec<String>,
    pub output: PathBuf,
}

impl TranscodeJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            inputs: vec![input.into()],
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn input_option(mut self, flag: &str, value: impl ToString) -> Self {
        self.input_options.push(flag.to_string());
        self.input_options.push(value.to_string());
        self
    }

    pub fn output_option(mut self, flag: &str, value: impl ToString) -> Self {
        self.output_options.push(flag.to_string());
        self.output_options.push(value.to_string());
        self
    }

    pub fn video_filter(mut self, filter: impl Into<String>) -> Self {
        self.video_filters.push(filter.into());
        self
    }

    pub fn audio_filter(mut self, filter: impl Into<String>) -> Self {
        self.audio_filters.push(filter.into());
        self
    }

    /// The ffmpeg argument vector for this job.
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into(), "-loglevel".into(), "error".into()];
        args.extend(self.input_options.iter().cloned());
        for input in &self.inputs {
            args.push("-i".into());
            args.push(input.to_string_lossy().into_owned());
        }
        if !self.video_filters.is_empty() {
            args.push("-filter:v".into());
            args.push(self.video_filters.join(","));
        }
        if !self.audio_filters.is_empty() {
            args.push("-filter:a".into());
            args.push(self.audio_filters.join(","));
        }
        args.extend(self.output_options.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

// ---------------------------------------------------------------------------
// MediaEngine trait
// ---------------------------------------------------------------------------

/// Abstraction over the external processing engine that instructions drive.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Run a transcode job and return the produced file.
    async fn transcode(&self, job: &TranscodeJob) -> Result<PathBuf>;

    /// Duration in seconds, or `None` when the container does not report one.
    async fn probe_duration(&self, path: &Path) -> Result<Option<f64>>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// FfmpegEngine
// ---------------------------------------------------------------------------

/// Subset of `ffprobe -print_format json -show_format` output.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}

/// Parse the duration out of ffprobe's JSON output.
pub fn parse_probe_duration(json: &str) -> Result<Option<f64>> {
    let probe: FfprobeOutput = serde_json::from_str(json)?;
    Ok(probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok()))
}

/// Media engine backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Duration,
}

impl FfmpegEngine {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Locate both binaries on `PATH`.
    pub fn from_path() -> Result<Self> {
        let find = |tool: &str| {
            which::which(tool).map_err(|e| ReelflowError::ToolError {
                tool: tool.to_string(),
                message: format!("not found on PATH: {e}"),
            })
        };
        Ok(Self::new(find("ffmpeg")?, find("ffprobe")?))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn transcode(&self, job: &TranscodeJob) -> Result<PathBuf> {
        tracing::info!(
            output = %job.output.display(),
            inputs = job.inputs.len(),
            "Running ffmpeg"
        );
        ToolCommand::new(self.ffmpeg.clone())
            .args(job.to_args())
            .timeout(self.timeout)
            .execute()
            .await?;
        if !tokio::fs::try_exists(&job.output).await? {
            return Err(ReelflowError::ToolError {
                tool: "ffmpeg".into(),
                message: format!("no output written to {}", job.output.display()),
            });
        }
        Ok(job.output.clone())
    }

    async fn probe_duration(&self, path: &Path) -> Result<Option<f64>> {
        if !tokio::fs::try_exists(path).await? {
            return Err(ReelflowError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let out = ToolCommand::new(self.ffprobe.clone())
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path.to_string_lossy())
            .timeout(self.timeout)
            .execute()
            .await?;
        let duration = parse_probe_duration(&out.stdout)?;
        tracing::debug!(path = %path.display(), ?duration, "Probed duration");
        Ok(duration)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_put_input_options_before_input() {
        let job = TranscodeJob::new("in.mp4", "out.mp4")
            .input_option("-ss", 5)
            .input_option("-t", 10);
        assert_eq!(
            job.to_args(),
            vec![
                "-y", "-hide_banner", "-loglevel", "error", "-ss", "5", "-t", "10", "-i", "in.mp4",
                "out.mp4"
            ]
        );
    }

    #[test]
    fn filters_are_joined_per_stream() {
        let job = TranscodeJob::new("in.mp4", "out.mp4")
            .video_filter("setpts=0.5*PTS")
            .audio_filter("atempo=2")
            .audio_filter("volume=1")
            .output_option("-r", 24);
        let args = job.to_args();
        let v = args.iter().position(|a| a == "-filter:v").unwrap();
        assert_eq!(args[v + 1], "setpts=0.5*PTS");
        let a = args.iter().position(|a| a == "-filter:a").unwrap();
        assert_eq!(args[a + 1], "atempo=2,volume=1");
        assert_eq!(&args[args.len() - 3..], &["-r", "24", "out.mp4"]);
    }

    #[test]
    fn probe_duration_from_json() {
        let json = r#"{"format": {"filename": "a.mp4", "duration": "12.480000"}}"#;
        assert_eq!(parse_probe_duration(json).unwrap(), Some(12.48));
    }

    #[test]
    fn probe_duration_missing_or_not_a_number() {
        assert_eq!(parse_probe_duration(r#"{"format": {}}"#).unwrap(), None);
        assert_eq!(parse_probe_duration(r#"{}"#).unwrap(), None);
        assert_eq!(
            parse_probe_duration(r#"{"format": {"duration": "N/A"}}"#).unwrap(),
            None
        );
        assert!(parse_probe_duration("not json").is_err());
    }
}
