//! Runtime step: lifecycle, input resolution, and external deliveries.
//!
//! A step moves `PENDING -> RESOLVED -> PROCESSING -> ENDED`, or to `FAILED`
//! from any non-terminal status. The status lives in a `watch` channel so
//! any number of tasks can wait on it; the ended payload is stored before
//! the `ENDED` transition is published.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use reelflow_media::{unique_destination, StepDirs};
use reelflow_types::{extension_of, ReelflowError, Result, StepStatus};
use tokio::sync::{watch, Notify};

use crate::archive;
use crate::definition::{StepDefinition, StepKind};
use crate::events::PipelineEvent;
use crate::handler::{InstructionContext, StepBody};
use crate::resolve::{self, ContentProducer};
use crate::runtime::Runtime;
use crate::scope::Scope;

struct Binding {
    scope: Scope,
    dirs: StepDirs,
}

/// Files delivered by other steps' archive routing while this one processes.
#[derive(Default)]
struct ExternalOutputs {
    accepting: bool,
    in_flight: usize,
    files: Vec<PathBuf>,
}

pub struct Step {
    definition: Arc<StepDefinition>,
    body: StepBody,
    runtime: Arc<Runtime>,
    status: watch::Sender<StepStatus>,
    binding: OnceLock<Binding>,
    inputs: Mutex<Vec<PathBuf>>,
    external: Mutex<ExternalOutputs>,
    deliveries_done: Notify,
    outputs: Mutex<Option<Arc<[PathBuf]>>>,
    failure: Mutex<Option<String>>,
    output_index: AtomicUsize,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("status", &self.status())
            .finish()
    }
}

impl Step {
    pub fn new(definition: Arc<StepDefinition>, body: StepBody, runtime: Arc<Runtime>) -> Arc<Self> {
        let (status, _) = watch::channel(StepStatus::Pending);
        Arc::new(Self {
            definition,
            body,
            runtime,
            status,
            binding: OnceLock::new(),
            inputs: Mutex::new(Vec::new()),
            external: Mutex::new(ExternalOutputs::default()),
            deliveries_done: Notify::new(),
            outputs: Mutex::new(None),
            failure: Mutex::new(None),
            output_index: AtomicUsize::new(0),
        })
    }

    // -- Accessors ----------------------------------------------------------

    pub fn id(&self) -> u32 {
        self.definition.id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn kind(&self) -> StepKind {
        self.definition.kind
    }

    pub fn definition(&self) -> &Arc<StepDefinition> {
        &self.definition
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn status(&self) -> StepStatus {
        *self.status.borrow()
    }

    /// Watch status changes directly.
    pub fn subscribe(&self) -> watch::Receiver<StepStatus> {
        self.status.subscribe()
    }

    /// Resolved input files, staged in this step's `input/` directory.
    pub fn inputs(&self) -> Vec<PathBuf> {
        self.inputs.lock().clone()
    }

    /// The ended payload, once the step has ended.
    pub fn outputs(&self) -> Option<Arc<[PathBuf]>> {
        self.outputs.lock().clone()
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    pub fn dirs(&self) -> Result<&StepDirs> {
        self.binding
            .get()
            .map(|b| &b.dirs)
            .ok_or_else(|| self.invalid_state("use its workspace before init"))
    }

    pub fn scope(&self) -> Result<&Scope> {
        self.binding
            .get()
            .map(|b| &b.scope)
            .ok_or_else(|| self.invalid_state("look up steps before init"))
    }

    /// Steps of the current iteration, for statements.
    pub fn nested_steps(&self) -> Vec<Arc<Step>> {
        match &self.body {
            StepBody::Statement(statement) => statement.nested_steps(),
            StepBody::Instruction(_) => Vec::new(),
        }
    }

    pub fn current_item(&self) -> Option<PathBuf> {
        match &self.body {
            StepBody::Statement(statement) => statement.current_item(),
            StepBody::Instruction(_) => None,
        }
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Create the workspace, bind the lookup scope, parse every raw input, and
    /// start resolving them in the background.
    ///
    /// Malformed selectors, unknown step ids, and missing literal files fail
    /// here, before anything is spawned.
    pub async fn init(self: &Arc<Self>, scope: Scope, workspace_parent: &Path) -> Result<()> {
        if self.binding.get().is_some() {
            return Err(self.invalid_state("initialize twice"));
        }
        let dirs = self
            .runtime
            .workspace()
            .create_step_dirs(workspace_parent, self.id())
            .await?;
        if self.binding.set(Binding { scope, dirs }).is_err() {
            return Err(self.invalid_state("initialize twice"));
        }

        let scope = self.scope()?;
        let producers = self
            .definition
            .raw_inputs
            .iter()
            .map(|raw| resolve::input_producer(self, raw, scope))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(step = self.id(), inputs = producers.len(), "Step initialized");
        let step = Arc::clone(self);
        tokio::spawn(async move { step.resolve_inputs(producers).await });
        Ok(())
    }

    async fn resolve_inputs(self: Arc<Self>, producers: Vec<ContentProducer>) {
        let collected = match self.runtime.config().resolution_timeout() {
            Some(limit) => tokio::time::timeout(limit, resolve::collect_content(producers))
                .await
                .unwrap_or_else(|_| {
                    Err(ReelflowError::ResolutionTimeout {
                        step: self.id(),
                        timeout_ms: limit.as_millis() as u64,
                    })
                }),
            None => resolve::collect_content(producers).await,
        };
        let staged = match collected {
            Ok(files) => self.stage_inputs(&files).await,
            Err(e) => Err(e),
        };
        match staged {
            Ok(files) => {
                tracing::debug!(step = self.id(), count = files.len(), "Inputs resolved");
                *self.inputs.lock() = files;
                if let Err(e) = self.transition(StepStatus::Resolved) {
                    tracing::debug!(step = self.id(), error = %e, "Resolution finished after step stopped");
                }
            }
            Err(e) => self.fail(&e),
        }
    }

    /// Copy resolved files into `input/`, keeping their names.
    async fn stage_inputs(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let input_dir = &self.dirs()?.input;
        let mut staged = Vec::with_capacity(files.len());
        for file in files {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| ReelflowError::FileNotFound { path: file.clone() })?;
            let dest = unique_destination(input_dir, name);
            copy_file(file, &dest).await?;
            staged.push(dest);
        }
        Ok(staged)
    }

    /// Wait for resolution, process, route the outputs, and end.
    ///
    /// Errors that do not name a step are returned as
    /// [`ReelflowError::StepFailed`] for this one.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.wait_for_status(StepStatus::Resolved).await?;
        match self.execute().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail(&e);
                Err(self.attribute(e))
            }
        }
    }

    fn attribute(&self, error: ReelflowError) -> ReelflowError {
        match error.step_id() {
            Some(_) => error,
            None => ReelflowError::StepFailed {
                step: self.id(),
                message: error.to_string(),
            },
        }
    }

    async fn execute(self: &Arc<Self>) -> Result<()> {
        self.external.lock().accepting = true;
        self.transition(StepStatus::Processing)?;
        tracing::info!(step = self.id(), name = %self.name(), "Processing step");

        let mut files = match &self.body {
            StepBody::Instruction(instruction) => {
                let inputs = self.inputs();
                let ctx = InstructionContext {
                    step_id: self.id(),
                    instruction: instruction.name(),
                    args: &self.definition.args,
                    inputs: &inputs,
                    output_dir: &self.dirs()?.output,
                    engine: self.runtime.engine(),
                };
                instruction.process(&ctx).await?
            }
            StepBody::Statement(statement) => statement.process(self).await?,
        };
        files.extend(self.drain_external().await);

        archive::route(self, &files).await?;

        *self.outputs.lock() = Some(Arc::from(files.as_slice()));
        self.runtime.events().emit(PipelineEvent::StepEnded {
            step_id: self.id(),
            outputs: files.clone(),
        });
        self.transition(StepStatus::Ended)?;
        tracing::info!(step = self.id(), outputs = files.len(), "Step ended");
        Ok(())
    }

    /// Resolve once the status is at or past `target`.
    ///
    /// A failed step resolves every waiter: with `Ok` when `target` is
    /// `Failed` itself, otherwise with the failure.
    pub async fn wait_for_status(&self, target: StepStatus) -> Result<()> {
        let mut rx = self.status.subscribe();
        let reached = {
            let status = rx
                .wait_for(|s| *s >= target || s.is_terminal())
                .await
                .map_err(|_| ReelflowError::Other(format!("step {} was dropped", self.id())))?;
            *status
        };
        if reached == StepStatus::Failed && target != StepStatus::Failed {
            return Err(ReelflowError::StepFailed {
                step: self.id(),
                message: self.failure().unwrap_or_else(|| "unknown failure".into()),
            });
        }
        Ok(())
    }

    /// Wait for the ended payload.
    pub async fn wait_ended(&self) -> Result<Arc<[PathBuf]>> {
        self.wait_for_status(StepStatus::Ended).await?;
        self.outputs()
            .ok_or_else(|| self.invalid_state("publish outputs"))
    }

    // -- External deliveries ------------------------------------------------

    /// Take files produced elsewhere into this step's outputs. Only allowed
    /// while the step is processing; the copies are named
    /// `{id}-{label}-output-{n}.{ext}`.
    pub async fn add_external_output_files(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        {
            let mut external = self.external.lock();
            if !external.accepting || self.status() != StepStatus::Processing {
                return Err(self.invalid_state("accept external output files"));
            }
            external.in_flight += 1;
        }

        let copied = self.copy_into_output(files).await;

        let mut external = self.external.lock();
        external.in_flight -= 1;
        if let Ok(paths) = &copied {
            external.files.extend(paths.iter().cloned());
        }
        if external.in_flight == 0 {
            self.deliveries_done.notify_waiters();
        }
        copied
    }

    async fn copy_into_output(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let output_dir = &self.dirs()?.output;
        let mut copied = Vec::with_capacity(files.len());
        for file in files {
            let n = self.output_index.fetch_add(1, Ordering::SeqCst) + 1;
            let ext = extension_of(file).unwrap_or_else(|| "mp4".into());
            let dest = output_dir.join(format!(
                "{}-{}-output-{}.{}",
                self.id(),
                self.body.output_label(),
                n,
                ext
            ));
            copy_file(file, &dest).await?;
            copied.push(dest);
        }
        Ok(copied)
    }

    /// Stop accepting deliveries and collect what arrived, waiting for copies
    /// already underway.
    async fn drain_external(&self) -> Vec<PathBuf> {
        loop {
            let done = self.deliveries_done.notified();
            {
                let mut external = self.external.lock();
                external.accepting = false;
                if external.in_flight == 0 {
                    return std::mem::take(&mut external.files);
                }
            }
            done.await;
        }
    }

    // -- Status -------------------------------------------------------------

    fn transition(&self, next: StepStatus) -> Result<()> {
        let mut from = next;
        let changed = self.status.send_if_modified(|current| {
            from = *current;
            if current.can_advance_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if !changed {
            return Err(ReelflowError::InvalidTransition {
                step: self.id(),
                from,
                to: next,
            });
        }
        tracing::debug!(step = self.id(), %from, to = %next, "Status changed");
        self.runtime.events().emit(PipelineEvent::StepStatusChanged {
            step_id: self.id(),
            status: next,
        });
        Ok(())
    }

    /// Move to `FAILED` and record why. No-op once terminal.
    pub(crate) fn fail(&self, error: &ReelflowError) {
        if self.status().is_terminal() {
            return;
        }
        self.failure.lock().get_or_insert_with(|| error.to_string());
        self.external.lock().accepting = false;
        if self.transition(StepStatus::Failed).is_ok() {
            tracing::error!(step = self.id(), error = %error, "Step failed");
            self.runtime.events().emit(PipelineEvent::StepFailed {
                step_id: self.id(),
                error: error.to_string(),
            });
        }
    }

    /// Fail this step, and the current nested steps of a statement, as
    /// cancelled.
    pub(crate) fn cancel(&self) {
        for nested in self.nested_steps() {
            nested.cancel();
        }
        self.fail(&ReelflowError::Cancelled { step: self.id() });
    }

    fn invalid_state(&self, action: &str) -> ReelflowError {
        ReelflowError::InvalidState {
            step: self.id(),
            status: self.status(),
            action: action.to_string(),
        }
    }
}

async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    tokio::fs::copy(from, to).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ReelflowError::FileNotFound {
                path: from.to_path_buf(),
            }
        } else {
            e.into()
        }
    })?;
    Ok(())
}
