//! Pipeline definitions, step lifecycle, scheduling, and media instructions.
//!
//! This crate implements the reelflow runner: JSON pipeline loading, the
//! step state machine, selector resolution across nested scopes, archive
//! routing, the `foreach` statement, the built-in instructions, and the
//! lint rules that run before any step is instantiated.

pub mod archive;
pub mod config;
pub mod definition;
pub mod engine;
pub mod events;
pub mod foreach;
pub mod handler;
pub mod instructions;
pub mod resolve;
pub mod runtime;
pub mod scheduler;
pub mod scope;
pub mod step;
pub mod validation;

pub use config::PipelineConfig;
pub use definition::{ArchiveOptions, PipelineDefinition, StepDefinition, StepKind};
pub use engine::{PipelineExecutor, RunReport, StepReport};
pub use events::{EventEmitter, PipelineEvent};
pub use foreach::Foreach;
pub use handler::{
    default_registry, parse_args, InputArity, Instruction, InstructionArgs, InstructionContext,
    Statement, StatementFactory, StepBody, StepRegistry,
};
pub use instructions::{AudioSync, Framerate, Resize, Segment, Speed, Split};
pub use resolve::{ContentProducer, Resolution};
pub use runtime::Runtime;
pub use scheduler::{RunningSteps, Scheduler};
pub use scope::Scope;
pub use step::Step;
pub use validation::{
    validate, validate_or_raise, Diagnostic, LintRule, Severity, StepNode, StepTree,
    ValidationContext,
};
