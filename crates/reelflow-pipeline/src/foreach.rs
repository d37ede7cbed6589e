//! The `foreach` statement: run a nested step list once per input file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reelflow_types::Result;

use crate::definition::StepDefinition;
use crate::events::PipelineEvent;
use crate::handler::Statement;
use crate::scheduler::Scheduler;
use crate::step::Step;

pub struct Foreach {
    body: Vec<Arc<StepDefinition>>,
    nested: RwLock<Vec<Arc<Step>>>,
    current_item: RwLock<Option<PathBuf>>,
    iterations: AtomicUsize,
}

impl Foreach {
    pub const NAME: &'static str = "foreach";

    pub fn new(definition: &StepDefinition) -> Self {
        Self {
            body: definition.steps.clone(),
            nested: RwLock::new(Vec::new()),
            current_item: RwLock::new(None),
            iterations: AtomicUsize::new(0),
        }
    }

    pub fn factory(definition: &Arc<StepDefinition>) -> Result<Box<dyn Statement>> {
        Ok(Box::new(Self::new(definition)))
    }

    /// Iterations started so far.
    pub fn iterations(&self) -> usize {
        self.iterations.load(Ordering::SeqCst)
    }

    fn set_item(&self, item: Option<PathBuf>) {
        *self.current_item.write() = item;
    }
}

#[async_trait]
impl Statement for Foreach {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn output_label(&self) -> &str {
        "loop"
    }

    async fn process(&self, step: &Arc<Step>) -> Result<Vec<PathBuf>> {
        let runtime = step.runtime();
        let scheduler = Scheduler::new(Arc::clone(runtime));
        let scope = step.scope()?.clone();
        let workspace = step.dirs()?.root.clone();

        for (index, item) in step.inputs().into_iter().enumerate() {
            self.iterations.fetch_add(1, Ordering::SeqCst);
            tracing::info!(step = step.id(), index, item = %item.display(), "Foreach iteration");
            runtime.events().emit(PipelineEvent::LoopIteration {
                step_id: step.id(),
                index,
                item: item.clone(),
            });
            self.set_item(Some(item));

            let nested = scheduler.instantiate(&self.body)?;
            *self.nested.write() = nested.clone();

            let iteration = match scheduler.init(&nested, Some(&scope), &workspace).await {
                Ok(()) => scheduler.join(scheduler.run(&nested)).await,
                Err(e) => Err(e),
            };
            if let Err(e) = iteration {
                self.set_item(None);
                return Err(e);
            }
        }

        self.set_item(None);
        Ok(Vec::new())
    }

    fn nested_steps(&self) -> Vec<Arc<Step>> {
        self.nested.read().clone()
    }

    fn current_item(&self) -> Option<PathBuf> {
        self.current_item.read().clone()
    }
}
