//! Pipeline event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers (the CLI's `--events` printer, tests) can follow step lifecycles
//! without touching the scheduler.

use std::path::PathBuf;

use reelflow_types::StepStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted during pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    PipelineStarted {
        run_id: Uuid,
        step_count: usize,
    },
    PipelineCompleted {
        run_id: Uuid,
        archived: Vec<PathBuf>,
        duration_ms: u64,
    },
    PipelineFailed {
        run_id: Uuid,
        error: String,
    },
    StepStatusChanged {
        step_id: u32,
        status: StepStatus,
    },
    StepEnded {
        step_id: u32,
        outputs: Vec<PathBuf>,
    },
    StepFailed {
        step_id: u32,
        error: String,
    },
    LoopIteration {
        step_id: u32,
        index: usize,
        item: PathBuf,
    },
    FilesArchived {
        step_id: u32,
        files: Vec<PathBuf>,
    },
    FilesForwarded {
        from_step: u32,
        to_step: u32,
        files: Vec<PathBuf>,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
