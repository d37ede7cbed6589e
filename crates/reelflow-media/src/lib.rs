//! Media engine, workspace, and resource services for reelflow.
//!
//! Provides the `MediaEngine` trait with an ffmpeg/ffprobe implementation
//! (`FfmpegEngine`) and a recording `DryRunEngine`, the `ToolCommand`
//! subprocess builder, the per-step `Workspace`, and the global input/output
//! `Resources`.

pub mod command;
pub mod dry_run;
pub mod engine;
pub mod resources;
pub mod workspace;

pub use command::{ToolCommand, ToolOutput};
pub use dry_run::DryRunEngine;
pub use engine::{parse_probe_duration, FfmpegEngine, MediaEngine, TranscodeJob};
pub use resources::Resources;
pub use workspace::{unique_destination, StepDirs, Workspace};
