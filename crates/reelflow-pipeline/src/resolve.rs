//! Selector resolution: turning parsed selectors into steps or file producers.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use reelflow_selector::{is_selector, ResourceFilter, Selector, SelectorOutput, SelectorTarget};
use reelflow_types::{ReelflowError, Result};
use tokio::task::JoinSet;

use crate::runtime::Runtime;
use crate::scope::Scope;
use crate::step::Step;

/// A pending list of files.
pub type ContentProducer = Pin<Box<dyn Future<Output = Result<Vec<PathBuf>>> + Send + 'static>>;

/// What a selector evaluates to.
pub enum Resolution {
    Step(Arc<Step>),
    Content(ContentProducer),
}

/// Evaluate `selector` on behalf of `requester`.
///
/// Step and parent lookups happen now; waiting on outputs, reading the loop
/// item, and listing resources happen when the producer is polled.
pub fn resolve(selector: &Selector, requester: &Arc<Step>, scope: &Scope) -> Result<Resolution> {
    match selector.target() {
        SelectorTarget::Step { id, output } => {
            let target = scope
                .find_step(*id, requester)
                .ok_or(ReelflowError::StepNotFound {
                    target: *id,
                    requester: requester.id(),
                })?;
            if !output {
                return Ok(Resolution::Step(target));
            }
            let requester_id = requester.id();
            Ok(Resolution::Content(Box::pin(async move {
                match target.wait_ended().await {
                    Ok(files) => Ok(files.to_vec()),
                    Err(e) => {
                        tracing::debug!(step = requester_id, dependency = target.id(), error = %e, "Dependency failed");
                        Err(ReelflowError::DependencyFailed {
                            step: requester_id,
                            dependency: target.id(),
                        })
                    }
                }
            })))
        }
        SelectorTarget::Parent { item } => {
            let parent = scope
                .find_parent(requester)
                .ok_or(ReelflowError::ParentNotFound {
                    step: requester.id(),
                })?;
            if !item {
                return Ok(Resolution::Step(parent));
            }
            Ok(Resolution::Content(Box::pin(async move {
                parent
                    .current_item()
                    .map(|item| vec![item])
                    .ok_or(ReelflowError::NoLoopItem { step: parent.id() })
            })))
        }
        SelectorTarget::Resources(filter) => {
            let runtime = Arc::clone(requester.runtime());
            let filter = filter.clone();
            Ok(Resolution::Content(Box::pin(async move {
                resolve_resources(&runtime, &filter).await
            })))
        }
    }
}

/// Producer for one raw input: a literal file name or a content selector.
pub fn input_producer(requester: &Arc<Step>, raw: &str, scope: &Scope) -> Result<ContentProducer> {
    if !is_selector(raw) {
        let path = requester.runtime().resources().resolve_literal(raw)?;
        return Ok(Box::pin(async move { Ok(vec![path]) }));
    }
    let selector = requester.runtime().selectors().parse(raw)?;
    if selector.expected_output() != SelectorOutput::Content {
        return Err(ReelflowError::SelectorSyntax {
            selector: raw.to_string(),
            message: "inputs need file content; add ':output' or ':item'".into(),
        });
    }
    match resolve(&selector, requester, scope)? {
        Resolution::Content(producer) => Ok(producer),
        Resolution::Step(_) => Err(ReelflowError::SelectorSyntax {
            selector: raw.to_string(),
            message: "resolved to a step instead of files".into(),
        }),
    }
}

/// The step an archive target names.
pub fn resolve_target(requester: &Arc<Step>, raw: &str, scope: &Scope) -> Result<Arc<Step>> {
    let selector = requester.runtime().selectors().parse(raw)?;
    if selector.expected_output() != SelectorOutput::StepInstance {
        return Err(ReelflowError::SelectorSyntax {
            selector: raw.to_string(),
            message: "archive target must reference a step".into(),
        });
    }
    match resolve(&selector, requester, scope)? {
        Resolution::Step(step) => Ok(step),
        Resolution::Content(_) => Err(ReelflowError::SelectorSyntax {
            selector: raw.to_string(),
            message: "archive target must reference a step".into(),
        }),
    }
}

/// Files in the input directory that pass `filter`. Durations are probed only
/// for files that survive the type and name filters.
pub async fn resolve_resources(runtime: &Runtime, filter: &ResourceFilter) -> Result<Vec<PathBuf>> {
    let candidates = runtime.resources().list_inputs().await?;
    let kept = filter.apply_static(&candidates);
    let Some(duration) = filter.duration else {
        return Ok(kept);
    };

    let mut timed = Vec::with_capacity(kept.len());
    for file in kept {
        match runtime.engine().probe_duration(&file).await? {
            Some(secs) if duration.matches(secs) => timed.push(file),
            Some(_) => {}
            None => {
                tracing::debug!(path = %file.display(), "No known duration, skipping");
            }
        }
    }
    Ok(timed)
}

/// Poll every producer concurrently and concatenate their files in input
/// order. The first error aborts the rest.
pub async fn collect_content(producers: Vec<ContentProducer>) -> Result<Vec<PathBuf>> {
    let count = producers.len();
    let mut tasks = JoinSet::new();
    for (index, producer) in producers.into_iter().enumerate() {
        tasks.spawn(async move { (index, producer.await) });
    }

    let mut slots: Vec<Vec<PathBuf>> = vec![Vec::new(); count];
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined
            .map_err(|e| ReelflowError::Other(format!("input resolution task failed: {e}")))?;
        slots[index] = result?;
    }
    Ok(slots.into_iter().flatten().collect())
}
