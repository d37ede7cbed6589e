//! Instantiating, initializing, running, and joining a step list.

use std::path::Path;
use std::sync::Arc;

use reelflow_types::{ReelflowError, Result};
use tokio::task::JoinSet;

use crate::definition::StepDefinition;
use crate::runtime::Runtime;
use crate::scope::Scope;
use crate::step::Step;

/// Step tasks spawned by [`Scheduler::run`].
pub struct RunningSteps {
    steps: Vec<Arc<Step>>,
    tasks: JoinSet<Result<()>>,
}

impl RunningSteps {
    pub fn steps(&self) -> &[Arc<Step>] {
        &self.steps
    }
}

pub struct Scheduler {
    runtime: Arc<Runtime>,
}

impl Scheduler {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    /// Fresh runtime steps for `definitions`.
    pub fn instantiate(&self, definitions: &[Arc<StepDefinition>]) -> Result<Vec<Arc<Step>>> {
        definitions
            .iter()
            .map(|def| {
                let body = self.runtime.registry().build_body(def)?;
                Ok(Step::new(Arc::clone(def), body, Arc::clone(&self.runtime)))
            })
            .collect()
    }

    /// Initialize every step against `scope`, or against `steps` themselves
    /// when no scope is given. On the first failure the rest are cancelled.
    pub async fn init(
        &self,
        steps: &[Arc<Step>],
        scope: Option<&Scope>,
        workspace_parent: &Path,
    ) -> Result<()> {
        let scope = scope.cloned().unwrap_or_else(|| Scope::new(steps));
        for step in steps {
            if let Err(e) = step.init(scope.clone(), workspace_parent).await {
                step.fail(&e);
                for other in steps {
                    other.cancel();
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Spawn `Step::run` for every step.
    pub fn run(&self, steps: &[Arc<Step>]) -> RunningSteps {
        let mut tasks = JoinSet::new();
        for step in steps {
            tasks.spawn(Arc::clone(step).run());
        }
        RunningSteps {
            steps: steps.to_vec(),
            tasks,
        }
    }

    /// Wait for every step to finish. The first failure aborts the remaining
    /// tasks, cancels every unfinished step, and is returned.
    pub async fn join(&self, mut running: RunningSteps) -> Result<()> {
        while let Some(joined) = running.tasks.join_next().await {
            let error = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => ReelflowError::Other(format!("step task panicked: {e}")),
            };
            running.tasks.abort_all();
            for step in &running.steps {
                step.cancel();
            }
            return Err(error);
        }
        Ok(())
    }
}
