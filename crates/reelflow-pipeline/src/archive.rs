//! Routing of a step's outputs after it processes.

use std::path::PathBuf;
use std::sync::Arc;

use reelflow_types::Result;

use crate::events::PipelineEvent;
use crate::resolve;
use crate::step::Step;

/// Apply the step's archive options to `files`: copy them into the output
/// directory, or deliver them to the target step's external outputs.
pub async fn route(step: &Arc<Step>, files: &[PathBuf]) -> Result<()> {
    let Some(options) = &step.definition().archive else {
        return Ok(());
    };
    let filtered = options.filter.apply(files);
    let runtime = step.runtime();

    match &options.target {
        None => {
            let archived = runtime.resources().archive(&filtered).await?;
            tracing::info!(step = step.id(), count = archived.len(), "Archived outputs");
            runtime.events().emit(PipelineEvent::FilesArchived {
                step_id: step.id(),
                files: archived,
            });
        }
        Some(raw) => {
            let target = resolve::resolve_target(step, raw, step.scope()?)?;
            let delivered = target.add_external_output_files(&filtered).await?;
            tracing::info!(
                step = step.id(),
                target = target.id(),
                count = delivered.len(),
                "Forwarded outputs"
            );
            runtime.events().emit(PipelineEvent::FilesForwarded {
                from_step: step.id(),
                to_step: target.id(),
                files: delivered,
            });
        }
    }
    Ok(())
}
