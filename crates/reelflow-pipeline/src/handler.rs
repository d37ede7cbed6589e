//! Instruction and statement traits, and the step registry that maps
//! definition names to them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reelflow_media::MediaEngine;
use reelflow_types::{ReelflowError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::definition::{StepDefinition, StepKind};
use crate::step::Step;

// ---------------------------------------------------------------------------
// Instruction trait
// ---------------------------------------------------------------------------

/// How many input files an instruction accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputArity {
    pub min: usize,
    pub max: Option<usize>,
}

impl InputArity {
    pub const fn exactly(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    pub const fn at_least(n: usize) -> Self {
        Self { min: n, max: None }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }
}

/// Typed instruction arguments with semantic checks beyond their shape.
pub trait InstructionArgs: DeserializeOwned {
    fn check(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Deserialize and check an args bundle.
pub fn parse_args<T: InstructionArgs>(args: &Value) -> std::result::Result<T, String> {
    let parsed: T = serde_json::from_value(args.clone()).map_err(|e| e.to_string())?;
    parsed.check()?;
    Ok(parsed)
}

/// Everything an instruction sees while it processes.
pub struct InstructionContext<'a> {
    pub step_id: u32,
    pub instruction: &'a str,
    pub args: &'a Value,
    pub inputs: &'a [PathBuf],
    pub output_dir: &'a Path,
    pub engine: &'a Arc<dyn MediaEngine>,
}

impl InstructionContext<'_> {
    pub fn args<T: InstructionArgs>(&self) -> Result<T> {
        parse_args(self.args).map_err(|message| self.invalid_args(message))
    }

    /// The only input file, for single-input instructions.
    pub fn single_input(&self) -> Result<&Path> {
        match self.inputs {
            [input] => Ok(input.as_path()),
            other => Err(self.invalid_args(format!(
                "expected exactly 1 input file, got {}",
                other.len()
            ))),
        }
    }

    /// `<output_dir>/<id>-<instruction>-output.mp4`
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}-output.mp4", self.step_id, self.instruction))
    }

    /// `<output_dir>/<id>-<instruction>-output-<index>.mp4`
    pub fn indexed_output_path(&self, index: usize) -> PathBuf {
        self.output_dir.join(format!(
            "{}-{}-output-{}.mp4",
            self.step_id, self.instruction, index
        ))
    }

    pub fn invalid_args(&self, message: impl Into<String>) -> ReelflowError {
        ReelflowError::InvalidArgs {
            step: self.step_id,
            instruction: self.instruction.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait Instruction: Send + Sync {
    /// The identifier used in definitions (e.g. "segment", "resize").
    fn name(&self) -> &str;

    /// Check an args bundle before anything runs.
    fn validate_args(&self, args: &Value) -> std::result::Result<(), String>;

    fn arity(&self) -> InputArity {
        InputArity::exactly(1)
    }

    /// Whether literal inputs must be video files.
    fn video_only(&self) -> bool {
        false
    }

    /// Run the instruction and return the files it produced.
    async fn process(&self, ctx: &InstructionContext<'_>) -> Result<Vec<PathBuf>>;
}

// ---------------------------------------------------------------------------
// Statement trait
// ---------------------------------------------------------------------------

/// Control flow that owns a nested step list.
#[async_trait]
pub trait Statement: Send + Sync {
    fn name(&self) -> &str;

    /// Label used in the names of externally delivered files.
    fn output_label(&self) -> &str {
        self.name()
    }

    async fn process(&self, step: &Arc<Step>) -> Result<Vec<PathBuf>>;

    /// The nested steps of the current iteration.
    fn nested_steps(&self) -> Vec<Arc<Step>>;

    fn current_item(&self) -> Option<PathBuf>;
}

pub type StatementFactory = fn(&Arc<StepDefinition>) -> Result<Box<dyn Statement>>;

/// The behavior a runtime step dispatches to.
pub enum StepBody {
    Instruction(Arc<dyn Instruction>),
    Statement(Box<dyn Statement>),
}

impl StepBody {
    pub fn name(&self) -> &str {
        match self {
            StepBody::Instruction(i) => i.name(),
            StepBody::Statement(s) => s.name(),
        }
    }

    pub fn output_label(&self) -> &str {
        match self {
            StepBody::Instruction(i) => i.name(),
            StepBody::Statement(s) => s.output_label(),
        }
    }
}

// ---------------------------------------------------------------------------
// StepRegistry
// ---------------------------------------------------------------------------

pub struct StepRegistry {
    instructions: HashMap<String, Arc<dyn Instruction>>,
    statements: HashMap<String, StatementFactory>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            instructions: HashMap::new(),
            statements: HashMap::new(),
        }
    }

    pub fn register_instruction(&mut self, instruction: impl Instruction + 'static) {
        let name = instruction.name().to_string();
        self.instructions.insert(name, Arc::new(instruction));
    }

    pub fn register_statement(&mut self, name: &str, factory: StatementFactory) {
        self.statements.insert(name.to_string(), factory);
    }

    pub fn instruction(&self, name: &str) -> Option<&Arc<dyn Instruction>> {
        self.instructions.get(name)
    }

    pub fn has(&self, kind: StepKind, name: &str) -> bool {
        match kind {
            StepKind::Instruction => self.instructions.contains_key(name),
            StepKind::Statement => self.statements.contains_key(name),
        }
    }

    /// Registered names of the given kind, sorted.
    pub fn names(&self, kind: StepKind) -> Vec<&str> {
        let mut names: Vec<&str> = match kind {
            StepKind::Instruction => self.instructions.keys().map(String::as_str).collect(),
            StepKind::Statement => self.statements.keys().map(String::as_str).collect(),
        };
        names.sort_unstable();
        names
    }

    /// Build the behavior for a definition. Statements get a fresh instance.
    pub fn build_body(&self, definition: &Arc<StepDefinition>) -> Result<StepBody> {
        let unknown = || ReelflowError::UnknownStep {
            kind: definition.kind.to_string(),
            name: definition.name.clone(),
        };
        match definition.kind {
            StepKind::Instruction => self
                .instructions
                .get(&definition.name)
                .map(|i| StepBody::Instruction(Arc::clone(i)))
                .ok_or_else(unknown),
            StepKind::Statement => {
                let factory = self.statements.get(&definition.name).ok_or_else(unknown)?;
                Ok(StepBody::Statement(factory(definition)?))
            }
        }
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Default registry factory
// ---------------------------------------------------------------------------

pub fn default_registry() -> StepRegistry {
    let mut reg = StepRegistry::new();
    reg.register_instruction(crate::instructions::Segment);
    reg.register_instruction(crate::instructions::Split);
    reg.register_instruction(crate::instructions::AudioSync);
    reg.register_instruction(crate::instructions::Resize);
    reg.register_instruction(crate::instructions::Speed);
    reg.register_instruction(crate::instructions::Framerate);
    reg.register_statement(crate::foreach::Foreach::NAME, crate::foreach::Foreach::factory);
    reg
}
