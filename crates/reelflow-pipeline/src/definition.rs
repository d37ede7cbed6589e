//! Pipeline definition loading.
//!
//! A pipeline file is JSON of the form
//! `{ "steps": [ { "id", "type", "name", "args": { "input": [...], "steps": [...] }, "archive": {...} } ] }`.
//! `args.input` becomes [`StepDefinition::raw_inputs`], `args.steps` becomes
//! the nested body of a statement, and whatever else is in `args` stays as a
//! JSON object for the instruction to interpret.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use reelflow_types::{MediaFilter, ReelflowError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Whether a step runs a media instruction or a control-flow statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Instruction,
    Statement,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Instruction => "instruction",
            StepKind::Statement => "statement",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a step's outputs go once it has processed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveOptions {
    /// A step selector. Without one, files land in the output directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub filter: MediaFilter,
}

/// One node of the pipeline definition tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawStep")]
pub struct StepDefinition {
    pub id: u32,
    pub kind: StepKind,
    pub name: String,
    pub raw_inputs: Vec<String>,
    /// Remaining arguments, always a JSON object.
    pub args: Value,
    pub archive: Option<ArchiveOptions>,
    pub steps: Vec<Arc<StepDefinition>>,
}

impl StepDefinition {
    pub fn is_statement(&self) -> bool {
        self.kind == StepKind::Statement
    }

    /// Number of definitions in this subtree, this one included.
    pub fn count(&self) -> usize {
        1 + self.steps.iter().map(|s| s.count()).sum::<usize>()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    id: i64,
    #[serde(rename = "type")]
    kind: StepKind,
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
    #[serde(default)]
    archive: Option<ArchiveOptions>,
}

impl TryFrom<RawStep> for StepDefinition {
    type Error = ReelflowError;

    fn try_from(raw: RawStep) -> Result<Self> {
        let id = u32::try_from(raw.id).map_err(|_| {
            ReelflowError::ValidationError(format!("step id {} is not a positive number", raw.id))
        })?;
        let mut args = raw.args;

        let raw_inputs = match args.remove("input") {
            None => Vec::new(),
            Some(value) => serde_json::from_value::<Vec<String>>(value).map_err(|_| {
                ReelflowError::ValidationError(format!(
                    "args.input of step {id} must be an array of strings"
                ))
            })?,
        };

        let steps = match raw.kind {
            StepKind::Statement => match args.remove("steps") {
                None => Vec::new(),
                Some(value) => serde_json::from_value::<Vec<StepDefinition>>(value)?
                    .into_iter()
                    .map(Arc::new)
                    .collect(),
            },
            StepKind::Instruction => Vec::new(),
        };

        Ok(StepDefinition {
            id,
            kind: raw.kind,
            name: raw.name,
            raw_inputs,
            args: Value::Object(args),
            archive: raw.archive,
            steps,
        })
    }
}

/// A whole pipeline: the top-level step list.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDefinition {
    pub name: Option<String>,
    pub steps: Vec<Arc<StepDefinition>>,
}

#[derive(Deserialize)]
struct RawPipeline {
    #[serde(default)]
    name: Option<String>,
    steps: Vec<StepDefinition>,
}

impl PipelineDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawPipeline = serde_json::from_str(json)?;
        Ok(Self {
            name: raw.name,
            steps: raw.steps.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReelflowError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                e.into()
            }
        })?;
        Self::from_json(&json)
    }

    /// Total number of step definitions, nested ones included.
    pub fn step_count(&self) -> usize {
        self.steps.iter().map(|s| s.count()).sum()
    }
}
