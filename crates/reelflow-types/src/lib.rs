//! Shared types, errors, step status, and media kinds for the reelflow pipeline engine.
//!
//! This crate provides the foundational types used across all other reelflow crates:
//! - `ReelflowError`: unified error taxonomy
//! - `StepStatus`: the step lifecycle state machine
//! - `MediaKind` / `MediaFilter`: extension tables and file-type filtering

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Unified error type for all reelflow subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ReelflowError {
    // === Definition Errors ===
    #[error("Invalid selector '{selector}': {message}")]
    SelectorSyntax { selector: String, message: String },

    #[error("Unknown selector '{selector}'")]
    UnknownSelector { selector: String },

    #[error("Pipeline validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid arguments for '{instruction}' on step {step}: {message}")]
    InvalidArgs {
        step: u32,
        instruction: String,
        message: String,
    },

    #[error("No {kind} named '{name}' is registered")]
    UnknownStep { kind: String, name: String },

    // === Resolution Errors ===
    #[error("Could not find step {target} (requested by step {requester})")]
    StepNotFound { target: u32, requester: u32 },

    #[error("Step {step} is not nested inside a statement")]
    ParentNotFound { step: u32 },

    #[error("Statement {step} has no current loop item")]
    NoLoopItem { step: u32 },

    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Input resolution for step {step} timed out after {timeout_ms}ms")]
    ResolutionTimeout { step: u32, timeout_ms: u64 },

    // === State Errors ===
    #[error("Step {step} cannot {action} while {status}")]
    InvalidState {
        step: u32,
        status: StepStatus,
        action: String,
    },

    #[error("Step {step} cannot move from {from} to {to}")]
    InvalidTransition {
        step: u32,
        from: StepStatus,
        to: StepStatus,
    },

    // === Processing Errors ===
    #[error("Tool '{tool}' error: {message}")]
    ToolError { tool: String, message: String },

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    #[error("Step {step} failed: {message}")]
    StepFailed { step: u32, message: String },

    #[error("Step {step} depends on step {dependency}, which failed")]
    DependencyFailed { step: u32, dependency: u32 },

    #[error("Step {step} was cancelled")]
    Cancelled { step: u32 },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ReelflowError {
    /// Returns `true` for errors caused by the pipeline definition itself.
    /// These are reported before any step runs.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            ReelflowError::SelectorSyntax { .. }
                | ReelflowError::UnknownSelector { .. }
                | ReelflowError::ValidationError(_)
                | ReelflowError::InvalidArgs { .. }
                | ReelflowError::UnknownStep { .. }
        )
    }

    /// Returns `true` for cross-step delivery or lifecycle violations.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            ReelflowError::InvalidState { .. } | ReelflowError::InvalidTransition { .. }
        )
    }

    /// The step the error is attributed to, when there is one.
    pub fn step_id(&self) -> Option<u32> {
        match self {
            ReelflowError::InvalidArgs { step, .. }
            | ReelflowError::ParentNotFound { step }
            | ReelflowError::NoLoopItem { step }
            | ReelflowError::ResolutionTimeout { step, .. }
            | ReelflowError::InvalidState { step, .. }
            | ReelflowError::InvalidTransition { step, .. }
            | ReelflowError::StepFailed { step, .. }
            | ReelflowError::DependencyFailed { step, .. }
            | ReelflowError::Cancelled { step } => Some(*step),
            ReelflowError::StepNotFound { requester, .. } => Some(*requester),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, ReelflowError>`.
pub type Result<T> = std::result::Result<T, ReelflowError>;

// ---------------------------------------------------------------------------
// StepStatus: lifecycle of a runtime step
// ---------------------------------------------------------------------------

/// Lifecycle status of a step.
///
/// The happy path is `Pending -> Resolved -> Processing -> Ended`, one stage at
/// a time. `Failed` can be entered from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Resolved,
    Processing,
    Ended,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Ended | StepStatus::Failed)
    }

    /// The next status on the happy path, if any.
    pub fn next(self) -> Option<StepStatus> {
        match self {
            StepStatus::Pending => Some(StepStatus::Resolved),
            StepStatus::Resolved => Some(StepStatus::Processing),
            StepStatus::Processing => Some(StepStatus::Ended),
            StepStatus::Ended | StepStatus::Failed => None,
        }
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_advance_to(self, to: StepStatus) -> bool {
        if to == StepStatus::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Resolved => "RESOLVED",
            StepStatus::Processing => "PROCESSING",
            StepStatus::Ended => "ENDED",
            StepStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Media kinds and file-type filtering
// ---------------------------------------------------------------------------

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "m4v"];
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a"];

/// Whether a file is a video or an audio file, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn from_extension(ext: &str) -> Option<MediaKind> {
        let ext = ext.to_ascii_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    pub fn of(path: &Path) -> Option<MediaKind> {
        extension_of(path).and_then(|ext| MediaKind::from_extension(&ext))
    }
}

/// Returns `true` if `ext` is one of the known video or audio extensions.
pub fn is_known_extension(ext: &str) -> bool {
    MediaKind::from_extension(ext).is_some()
}

/// Lowercased extension of `path`, without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Returns `true` if `name` is a bare file name with a known extension
/// (no directory components).
pub fn is_valid_filename(name: &str) -> bool {
    let path = Path::new(name);
    let bare = path.file_name().and_then(|n| n.to_str()) == Some(name);
    bare && !name.starts_with('.') && extension_of(path).is_some_and(|e| is_known_extension(&e))
}

/// File-type filter used by the resources selector and archive options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFilter {
    #[default]
    All,
    Videos,
    Audios,
}

impl MediaFilter {
    pub fn parse(value: &str) -> Option<MediaFilter> {
        match value {
            "all" => Some(MediaFilter::All),
            "videos" => Some(MediaFilter::Videos),
            "audios" => Some(MediaFilter::Audios),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaFilter::All => "all",
            MediaFilter::Videos => "videos",
            MediaFilter::Audios => "audios",
        }
    }

    pub fn matches(self, path: &Path) -> bool {
        match self {
            MediaFilter::All => true,
            MediaFilter::Videos => MediaKind::of(path) == Some(MediaKind::Video),
            MediaFilter::Audios => MediaKind::of(path) == Some(MediaKind::Audio),
        }
    }

    /// Keep the files matching this filter, preserving input order.
    pub fn apply<P: AsRef<Path> + Clone>(self, files: &[P]) -> Vec<P> {
        files
            .iter()
            .filter(|f| self.matches(f.as_ref()))
            .cloned()
            .collect()
    }
}

impl fmt::Display for MediaFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keep the files whose extension is in `extensions`, preserving input order.
pub fn filter_by_extensions<P: AsRef<Path> + Clone>(files: &[P], extensions: &[String]) -> Vec<P> {
    files
        .iter()
        .filter(|f| {
            extension_of(f.as_ref()).is_some_and(|ext| extensions.iter().any(|e| *e == ext))
        })
        .cloned()
        .collect()
}
