//! Pipeline executor: validate, prepare directories, schedule, report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use reelflow_types::{Result, StepStatus};
use serde::Serialize;
use uuid::Uuid;

use crate::definition::PipelineDefinition;
use crate::events::PipelineEvent;
use crate::runtime::Runtime;
use crate::scheduler::Scheduler;
use crate::step::Step;
use crate::validation::{validate_or_raise, Severity, ValidationContext};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Runs pipeline definitions against one [`Runtime`].
pub struct PipelineExecutor {
    runtime: Arc<Runtime>,
}

/// Final state of one step. Statements list the steps of their last
/// iteration.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub id: u32,
    pub name: String,
    pub status: StepStatus,
    pub outputs: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepReport>,
}

impl StepReport {
    fn from_step(step: &Step) -> Self {
        Self {
            id: step.id(),
            name: step.name().to_string(),
            status: step.status(),
            outputs: step.outputs().map(|o| o.to_vec()).unwrap_or_default(),
            error: step.failure(),
            steps: step
                .nested_steps()
                .iter()
                .map(|s| StepReport::from_step(s))
                .collect(),
        }
    }
}

/// The result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    /// Files copied into the output directory during this run.
    pub archived: Vec<PathBuf>,
}

impl RunReport {
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    /// Top-level step by id.
    pub fn step(&self, id: u32) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

impl PipelineExecutor {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime: Arc::new(runtime),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Validate and run `pipeline` to completion.
    ///
    /// Definition problems are reported before any directory is touched. A
    /// failing step cancels everything still running and its error is
    /// returned.
    pub async fn run(&self, pipeline: &PipelineDefinition) -> Result<RunReport> {
        let runtime = &self.runtime;

        // Validate
        let diagnostics = validate_or_raise(pipeline, &ValidationContext::for_runtime(runtime))?;
        for warning in diagnostics.iter().filter(|d| d.severity == Severity::Warning) {
            tracing::warn!(rule = %warning.rule, "{}", warning.message);
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(
            %run_id,
            pipeline = pipeline.name.as_deref().unwrap_or("unnamed"),
            steps = pipeline.step_count(),
            "Pipeline started"
        );
        runtime.events().emit(PipelineEvent::PipelineStarted {
            run_id,
            step_count: pipeline.step_count(),
        });

        let scheduler = Scheduler::new(Arc::clone(runtime));
        let mut steps = Vec::new();
        let mut archived_before = 0;
        let outcome = async {
            runtime.workspace().clear().await?;
            if runtime.config().clear_output {
                runtime.resources().clear_output().await?;
            }
            archived_before = runtime.resources().archived().len();
            steps = scheduler.instantiate(&pipeline.steps)?;
            scheduler
                .init(&steps, None, runtime.workspace().root())
                .await?;
            scheduler.join(scheduler.run(&steps)).await
        }
        .await;

        if let Err(e) = outcome {
            tracing::error!(%run_id, error = %e, "Pipeline failed");
            runtime.events().emit(PipelineEvent::PipelineFailed {
                run_id,
                error: e.to_string(),
            });
            return Err(e);
        }

        let archived: Vec<PathBuf> = runtime
            .resources()
            .archived()
            .into_iter()
            .skip(archived_before)
            .collect();
        let duration_ms = clock.elapsed().as_millis() as u64;
        tracing::info!(%run_id, archived = archived.len(), duration_ms, "Pipeline completed");
        runtime.events().emit(PipelineEvent::PipelineCompleted {
            run_id,
            archived: archived.clone(),
            duration_ms,
        });

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            steps: steps.iter().map(|s| StepReport::from_step(s)).collect(),
            archived,
        })
    }
}
