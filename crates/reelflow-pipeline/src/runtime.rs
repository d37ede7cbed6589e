//! Services shared by every step of a run.

use std::sync::Arc;

use reelflow_media::{MediaEngine, Resources, Workspace};
use reelflow_selector::SelectorRegistry;

use crate::config::PipelineConfig;
use crate::events::EventEmitter;
use crate::handler::{default_registry, StepRegistry};

/// Registries, engine, directories, and the event channel for one run.
pub struct Runtime {
    config: PipelineConfig,
    registry: StepRegistry,
    selectors: SelectorRegistry,
    engine: Arc<dyn MediaEngine>,
    workspace: Workspace,
    resources: Resources,
    events: EventEmitter,
}

impl Runtime {
    /// Runtime with the built-in steps and selectors.
    pub fn new(config: PipelineConfig, engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            workspace: Workspace::new(&config.workspace_dir),
            resources: Resources::new(&config.input_dir, &config.output_dir),
            config,
            registry: default_registry(),
            selectors: SelectorRegistry::builtin(),
            engine,
            events: EventEmitter::default(),
        }
    }

    pub fn with_registry(mut self, registry: StepRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_selectors(mut self, selectors: SelectorRegistry) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn selectors(&self) -> &SelectorRegistry {
        &self.selectors
    }

    pub fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }
}
