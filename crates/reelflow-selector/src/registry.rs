//! Ordered table of selector kinds.

use reelflow_types::{ReelflowError, Result};

use crate::ast::{ParamKey, Param, Selector, SelectorKind};
use crate::parser::{self, parse_with};

/// Recognizes one token and turns it into a parameter.
pub type TokenParser = fn(&str) -> Option<Param>;

/// Everything needed to parse one selector kind.
#[derive(Clone)]
pub struct SelectorSpec {
    pub kind: SelectorKind,
    /// Returns `true` if the input belongs to this kind.
    pub head: fn(&str) -> bool,
    /// Feed the head section itself (`step-7`) through the token parsers.
    pub include_name: bool,
    pub parsers: &'static [TokenParser],
    pub min_params: usize,
    pub max_params: Option<usize>,
    /// Keys that may not appear together.
    pub exclusive: &'static [(ParamKey, ParamKey)],
}

const STEP_PARSERS: &[TokenParser] = &[parser::parse_step_id, parser::parse_output_tag];
const PARENT_PARSERS: &[TokenParser] = &[parser::parse_item_tag];
const RESOURCE_PARSERS: &[TokenParser] = &[
    parser::parse_file_type,
    parser::parse_extensions,
    parser::parse_duration,
    parser::parse_filename_pattern,
];

impl SelectorSpec {
    pub fn step() -> Self {
        Self {
            kind: SelectorKind::Step,
            head: parser::is_step_head,
            include_name: true,
            parsers: STEP_PARSERS,
            min_params: 0,
            max_params: Some(1),
            exclusive: &[],
        }
    }

    pub fn parent() -> Self {
        Self {
            kind: SelectorKind::Parent,
            head: parser::is_parent_head,
            include_name: false,
            parsers: PARENT_PARSERS,
            min_params: 0,
            max_params: Some(1),
            exclusive: &[],
        }
    }

    pub fn resources() -> Self {
        Self {
            kind: SelectorKind::Resources,
            head: parser::is_resources_head,
            include_name: false,
            parsers: RESOURCE_PARSERS,
            min_params: 1,
            max_params: None,
            exclusive: &[(ParamKey::FileType, ParamKey::Extensions)],
        }
    }
}

/// Ordered registry of selector kinds. The first matching head wins.
#[derive(Clone, Default)]
pub struct SelectorRegistry {
    specs: Vec<SelectorSpec>,
}

impl SelectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the step, parent, and resources kinds.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(SelectorSpec::step());
        registry.register(SelectorSpec::parent());
        registry.register(SelectorSpec::resources());
        registry
    }

    pub fn register(&mut self, spec: SelectorSpec) {
        self.specs.push(spec);
    }

    pub fn find(&self, input: &str) -> Option<&SelectorSpec> {
        self.specs.iter().find(|spec| (spec.head)(input))
    }

    pub fn parse(&self, input: &str) -> Result<Selector> {
        let spec = self
            .find(input)
            .ok_or_else(|| ReelflowError::UnknownSelector {
                selector: input.to_string(),
            })?;
        parse_with(spec, input)
    }

    pub fn kinds(&self) -> impl Iterator<Item = SelectorKind> + '_ {
        self.specs.iter().map(|s| s.kind)
    }
}
