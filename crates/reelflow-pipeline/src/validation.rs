//! Pipeline validation: lint rules and diagnostics.
//!
//! Rules check a [`PipelineDefinition`] before anything is instantiated: id
//! scoping, registry names, instruction args, selector syntax, reference
//! visibility, and dependency cycles. Call [`validate`] for advisory
//! diagnostics or [`validate_or_raise`] to fail on any `Error`-severity issue.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use reelflow_selector::{is_selector, Selector, SelectorOutput, SelectorRegistry, SelectorTarget};
use reelflow_types::{is_valid_filename, MediaKind, ReelflowError};

use crate::definition::{PipelineDefinition, StepDefinition, StepKind};
use crate::handler::StepRegistry;
use crate::runtime::Runtime;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub step_id: Option<u32>,
    /// Location in the definition, e.g. `steps[1].args.input[0]`.
    pub field: Option<String>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Diagnostic {
    fn new(rule: &str, severity: Severity, message: String) -> Self {
        Self {
            rule: rule.into(),
            severity,
            message,
            step_id: None,
            field: None,
            fix: None,
        }
    }

    fn at(mut self, step_id: u32, field: impl Into<String>) -> Self {
        self.step_id = Some(step_id);
        self.field = Some(field.into());
        self
    }

    fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Validation context and step tree
// ---------------------------------------------------------------------------

/// What the rules check names and files against.
pub struct ValidationContext<'a> {
    pub registry: &'a StepRegistry,
    pub selectors: &'a SelectorRegistry,
    /// When set, literal inputs must exist here.
    pub input_dir: Option<&'a Path>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(registry: &'a StepRegistry, selectors: &'a SelectorRegistry) -> Self {
        Self {
            registry,
            selectors,
            input_dir: None,
        }
    }

    pub fn with_input_dir(mut self, input_dir: &'a Path) -> Self {
        self.input_dir = Some(input_dir);
        self
    }

    pub fn for_runtime(runtime: &'a Runtime) -> Self {
        Self::new(runtime.registry(), runtime.selectors())
            .with_input_dir(runtime.resources().input_dir())
    }
}

/// One definition with its location in the tree.
pub struct StepNode<'d> {
    pub def: &'d StepDefinition,
    /// `steps[0]`, `steps[2].args.steps[1]`, ...
    pub path: String,
    /// Enclosing statements, outermost first.
    pub ancestors: Vec<&'d StepDefinition>,
}

/// Flattened view of a definition tree, in pre-order.
pub struct StepTree<'d> {
    root: &'d [Arc<StepDefinition>],
    nodes: Vec<StepNode<'d>>,
}

impl<'d> StepTree<'d> {
    pub fn new(pipeline: &'d PipelineDefinition) -> Self {
        let mut nodes = Vec::new();
        flatten(&pipeline.steps, "steps", &mut Vec::new(), &mut nodes);
        Self {
            root: &pipeline.steps,
            nodes,
        }
    }

    pub fn nodes(&self) -> &[StepNode<'d>] {
        &self.nodes
    }

    /// Every sibling list with its path, the root list first.
    pub fn sibling_lists(&self) -> Vec<(String, &'d [Arc<StepDefinition>])> {
        let mut lists = vec![("steps".to_string(), self.root)];
        for node in &self.nodes {
            if node.def.is_statement() {
                lists.push((format!("{}.args.steps", node.path), node.def.steps.as_slice()));
            }
        }
        lists
    }

    /// Find step `id` the way the runtime does: the lists enclosing
    /// `requester`, innermost first, then the whole tree level by level.
    pub fn lookup(&self, requester: &StepNode<'d>, id: u32) -> Option<&StepNode<'d>> {
        let found = requester
            .ancestors
            .iter()
            .rev()
            .find_map(|parent| parent.steps.iter().find(|s| s.id == id))
            .map(|s| s.as_ref())
            .or_else(|| find_anywhere(self.root, id))?;
        self.node_of(found)
    }

    fn node_of(&self, def: &StepDefinition) -> Option<&StepNode<'d>> {
        self.nodes.iter().find(|n| std::ptr::eq(n.def, def))
    }

    fn index_of(&self, def: &StepDefinition) -> Option<usize> {
        self.nodes.iter().position(|n| std::ptr::eq(n.def, def))
    }
}

fn flatten<'d>(
    list: &'d [Arc<StepDefinition>],
    prefix: &str,
    ancestors: &mut Vec<&'d StepDefinition>,
    out: &mut Vec<StepNode<'d>>,
) {
    for (i, def) in list.iter().enumerate() {
        let path = format!("{prefix}[{i}]");
        out.push(StepNode {
            def,
            path: path.clone(),
            ancestors: ancestors.clone(),
        });
        if !def.steps.is_empty() {
            ancestors.push(def);
            flatten(&def.steps, &format!("{path}.args.steps"), ancestors, out);
            ancestors.pop();
        }
    }
}

fn find_anywhere(list: &[Arc<StepDefinition>], id: u32) -> Option<&StepDefinition> {
    if let Some(found) = list.iter().find(|s| s.id == id) {
        return Some(found);
    }
    list.iter().find_map(|s| find_anywhere(&s.steps, id))
}

/// A parsed selector reference made by a step.
struct Reference<'t, 'd> {
    node: &'t StepNode<'d>,
    field: String,
    selector: Selector,
    is_archive_target: bool,
}

/// Every selector that parses, from inputs and archive targets. Parse errors
/// are reported by their own rules.
fn references<'t, 'd>(tree: &'t StepTree<'d>, ctx: &ValidationContext<'_>) -> Vec<Reference<'t, 'd>> {
    let mut refs = Vec::new();
    for node in tree.nodes() {
        for (i, raw) in node.def.raw_inputs.iter().enumerate() {
            if !is_selector(raw) {
                continue;
            }
            if let Ok(selector) = ctx.selectors.parse(raw) {
                refs.push(Reference {
                    node,
                    field: format!("{}.args.input[{i}]", node.path),
                    selector,
                    is_archive_target: false,
                });
            }
        }
        let target = node.def.archive.as_ref().and_then(|a| a.target.as_deref());
        if let Some(Ok(selector)) = target.map(|raw| ctx.selectors.parse(raw)) {
            refs.push(Reference {
                node,
                field: format!("{}.archive.target", node.path),
                selector,
                is_archive_target: true,
            });
        }
    }
    refs
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, tree: &StepTree<'_>, ctx: &ValidationContext<'_>) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct PositiveIdRule;
impl LintRule for PositiveIdRule {
    fn name(&self) -> &str { "positive_id" }
    fn apply(&self, tree: &StepTree<'_>, _ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        tree.nodes()
            .iter()
            .filter(|n| n.def.id == 0)
            .map(|n| {
                Diagnostic::new(self.name(), Severity::Error, format!("Step '{}' at {} has id 0", n.def.name, n.path))
                    .at(0, format!("{}.id", n.path))
                    .fix("Use an id greater than 0")
            })
            .collect()
    }
}

struct UniqueIdsRule;
impl LintRule for UniqueIdsRule {
    fn name(&self) -> &str { "unique_ids" }
    fn apply(&self, tree: &StepTree<'_>, _ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for (path, list) in tree.sibling_lists() {
            let mut counts: HashMap<u32, usize> = HashMap::new();
            for def in list {
                *counts.entry(def.id).or_default() += 1;
            }
            let mut duplicated: Vec<_> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
            duplicated.sort_unstable();
            for (id, n) in duplicated {
                diags.push(
                    Diagnostic::new(
                        self.name(),
                        Severity::Error,
                        format!("Step id {id} is used {n} times in {path}"),
                    )
                    .at(id, path.clone())
                    .fix("Give every step in the same list its own id"),
                );
            }
        }
        diags
    }
}

struct KnownStepRule;
impl LintRule for KnownStepRule {
    fn name(&self) -> &str { "known_step" }
    fn apply(&self, tree: &StepTree<'_>, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        tree.nodes()
            .iter()
            .filter(|n| !ctx.registry.has(n.def.kind, &n.def.name))
            .map(|n| {
                Diagnostic::new(
                    self.name(),
                    Severity::Error,
                    format!("Step {} uses unknown {} '{}'", n.def.id, n.def.kind, n.def.name),
                )
                .at(n.def.id, format!("{}.name", n.path))
                .fix(format!(
                    "Known {}s: {}",
                    n.def.kind,
                    ctx.registry.names(n.def.kind).join(", ")
                ))
            })
            .collect()
    }
}

struct InstructionArgsRule;
impl LintRule for InstructionArgsRule {
    fn name(&self) -> &str { "instruction_args" }
    fn apply(&self, tree: &StepTree<'_>, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for node in tree.nodes() {
            if node.def.kind != StepKind::Instruction {
                continue;
            }
            let Some(instruction) = ctx.registry.instruction(&node.def.name) else {
                continue;
            };
            if let Err(message) = instruction.validate_args(&node.def.args) {
                diags.push(
                    Diagnostic::new(
                        self.name(),
                        Severity::Error,
                        format!("Step {} ({}): {message}", node.def.id, node.def.name),
                    )
                    .at(node.def.id, format!("{}.args", node.path)),
                );
            }
        }
        diags
    }
}

struct InputSelectorsRule;
impl LintRule for InputSelectorsRule {
    fn name(&self) -> &str { "input_selectors" }
    fn apply(&self, tree: &StepTree<'_>, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for node in tree.nodes() {
            let video_only = match node.def.kind {
                StepKind::Instruction => ctx
                    .registry
                    .instruction(&node.def.name)
                    .is_some_and(|i| i.video_only()),
                StepKind::Statement => false,
            };
            for (i, raw) in node.def.raw_inputs.iter().enumerate() {
                let field = format!("{}.args.input[{i}]", node.path);
                let error = |message: String| {
                    Diagnostic::new(self.name(), Severity::Error, message).at(node.def.id, field.clone())
                };

                if is_selector(raw) {
                    match ctx.selectors.parse(raw) {
                        Err(e) => diags.push(error(format!("Step {}: {e}", node.def.id))),
                        Ok(sel) if sel.expected_output() != SelectorOutput::Content => diags.push(
                            error(format!(
                                "Step {}: input '{raw}' names a step, not its files",
                                node.def.id
                            ))
                            .fix("Add ':output' (or ':item' for @parent)"),
                        ),
                        Ok(_) => {}
                    }
                    continue;
                }

                if !is_valid_filename(raw) {
                    diags.push(error(format!(
                        "Step {}: '{raw}' is not a media file name",
                        node.def.id
                    )));
                    continue;
                }
                if let Some(dir) = ctx.input_dir {
                    if !dir.join(raw).is_file() {
                        diags.push(error(format!(
                            "Step {}: input file '{raw}' not found in {}",
                            node.def.id,
                            dir.display()
                        )));
                    }
                }
                if video_only && MediaKind::of(Path::new(raw)) != Some(MediaKind::Video) {
                    diags.push(error(format!(
                        "Step {} ({}) only accepts video files, got '{raw}'",
                        node.def.id, node.def.name
                    )));
                }
            }
        }
        diags
    }
}

struct InputCountRule;
impl LintRule for InputCountRule {
    fn name(&self) -> &str { "input_count" }
    fn apply(&self, tree: &StepTree<'_>, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for node in tree.nodes() {
            if node.def.kind != StepKind::Instruction {
                continue;
            }
            let Some(instruction) = ctx.registry.instruction(&node.def.name) else {
                continue;
            };
            let arity = instruction.arity();
            let inputs = &node.def.raw_inputs;
            // Selectors can expand to any number of files; only an all-literal
            // list has a known size.
            let known = inputs.iter().all(|raw| !is_selector(raw));
            let count = inputs.len();
            let too_few = count < arity.min && (known || count == 0);
            let too_many = known && !arity.accepts(count) && count >= arity.min;
            if too_few || too_many {
                let expected = match arity.max {
                    Some(max) if max == arity.min => format!("{max}"),
                    Some(max) => format!("{} to {max}", arity.min),
                    None => format!("at least {}", arity.min),
                };
                diags.push(
                    Diagnostic::new(
                        self.name(),
                        Severity::Error,
                        format!(
                            "Step {} ({}) takes {expected} input file(s), got {count}",
                            node.def.id, node.def.name
                        ),
                    )
                    .at(node.def.id, format!("{}.args.input", node.path)),
                );
            }
        }
        diags
    }
}

struct ArchiveTargetRule;
impl LintRule for ArchiveTargetRule {
    fn name(&self) -> &str { "archive_target" }
    fn apply(&self, tree: &StepTree<'_>, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for node in tree.nodes() {
            let Some(raw) = node.def.archive.as_ref().and_then(|a| a.target.as_deref()) else {
                continue;
            };
            let field = format!("{}.archive.target", node.path);
            let error = |message: String| {
                Diagnostic::new(self.name(), Severity::Error, message).at(node.def.id, field.clone())
            };
            let selector = match ctx.selectors.parse(raw) {
                Ok(selector) => selector,
                Err(e) => {
                    diags.push(error(format!("Step {}: {e}", node.def.id)));
                    continue;
                }
            };
            if selector.expected_output() != SelectorOutput::StepInstance {
                diags.push(
                    error(format!(
                        "Step {}: archive target '{raw}' must name a step, not files",
                        node.def.id
                    ))
                    .fix("Use '@step-N' or '@parent' without a tag"),
                );
                continue;
            }
            let exists = match selector.target() {
                SelectorTarget::Step { id, .. } => tree.lookup(node, *id).is_some(),
                SelectorTarget::Parent { .. } => !node.ancestors.is_empty(),
                SelectorTarget::Resources(_) => false,
            };
            if !exists {
                diags.push(error(format!(
                    "Step {}: archive target '{raw}' does not exist",
                    node.def.id
                )));
            }
        }
        diags
    }
}

struct ReferencesExistRule;
impl LintRule for ReferencesExistRule {
    fn name(&self) -> &str { "references_exist" }
    fn apply(&self, tree: &StepTree<'_>, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for reference in references(tree, ctx) {
            if reference.is_archive_target {
                continue;
            }
            let node = reference.node;
            let message = match reference.selector.target() {
                SelectorTarget::Step { id, .. } if tree.lookup(node, *id).is_none() => {
                    format!("Step {} references step {id}, which does not exist", node.def.id)
                }
                SelectorTarget::Parent { .. } if node.ancestors.is_empty() => format!(
                    "Step {} uses '{}' outside a statement",
                    node.def.id,
                    reference.selector.raw()
                ),
                _ => continue,
            };
            diags.push(
                Diagnostic::new(self.name(), Severity::Error, message).at(node.def.id, reference.field),
            );
        }
        diags
    }
}

struct OutputVisibilityRule;
impl LintRule for OutputVisibilityRule {
    fn name(&self) -> &str { "output_visibility" }
    fn apply(&self, tree: &StepTree<'_>, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for reference in references(tree, ctx) {
            let SelectorTarget::Step { id, .. } = reference.selector.target() else {
                continue;
            };
            let requester = reference.node;
            let Some(target) = tree.lookup(requester, *id) else {
                continue;
            };
            let hidden = target.ancestors.iter().find(|statement| {
                !requester
                    .ancestors
                    .iter()
                    .any(|a| std::ptr::eq(*a, **statement))
            });
            if let Some(statement) = hidden {
                diags.push(
                    Diagnostic::new(
                        self.name(),
                        Severity::Error,
                        format!(
                            "Step {} references step {id} inside statement {}, which only exists while that statement iterates",
                            requester.def.id, statement.id
                        ),
                    )
                    .at(requester.def.id, reference.field),
                );
            }
        }
        diags
    }
}

struct DependencyCycleRule;
impl LintRule for DependencyCycleRule {
    fn name(&self) -> &str { "dependency_cycle" }
    fn apply(&self, tree: &StepTree<'_>, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let count = tree.nodes().len();
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (i, node) in tree.nodes().iter().enumerate() {
            for child in &node.def.steps {
                if let Some(j) = tree.index_of(child) {
                    edges[i].push(j);
                }
            }
        }
        for reference in references(tree, ctx) {
            if reference.is_archive_target {
                continue;
            }
            let SelectorTarget::Step { id, output: true } = reference.selector.target() else {
                continue;
            };
            let from = tree.index_of(reference.node.def);
            let to = tree.lookup(reference.node, *id).and_then(|t| tree.index_of(t.def));
            if let (Some(from), Some(to)) = (from, to) {
                edges[from].push(to);
            }
        }

        let mut cycles = Vec::new();
        let mut state = vec![Visit::New; count];
        let mut stack = Vec::new();
        for start in 0..count {
            if state[start] == Visit::New {
                find_cycles(start, &edges, &mut state, &mut stack, &mut cycles);
            }
        }

        let mut seen: HashSet<Vec<usize>> = HashSet::new();
        let mut diags = Vec::new();
        for cycle in cycles {
            let mut key = cycle.clone();
            key.sort_unstable();
            if !seen.insert(key) {
                continue;
            }
            let nodes = tree.nodes();
            let mut names: Vec<String> = cycle.iter().map(|&i| format!("step {}", nodes[i].def.id)).collect();
            names.push(format!("step {}", nodes[cycle[0]].def.id));
            let first = &nodes[cycle[0]];
            diags.push(
                Diagnostic::new(
                    self.name(),
                    Severity::Error,
                    format!("Dependency cycle: {}", names.join(" -> ")),
                )
                .at(first.def.id, first.path.clone())
                .fix("A step cannot wait on its own output, directly or through a statement body"),
            );
        }
        diags
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

fn find_cycles(
    node: usize,
    edges: &[Vec<usize>],
    state: &mut [Visit],
    stack: &mut Vec<usize>,
    cycles: &mut Vec<Vec<usize>>,
) {
    state[node] = Visit::Active;
    stack.push(node);
    for &next in &edges[node] {
        match state[next] {
            Visit::New => find_cycles(next, edges, state, stack, cycles),
            Visit::Active => {
                if let Some(pos) = stack.iter().position(|&n| n == next) {
                    cycles.push(stack[pos..].to_vec());
                }
            }
            Visit::Done => {}
        }
    }
    stack.pop();
    state[node] = Visit::Done;
}

struct StatementBodyRule;
impl LintRule for StatementBodyRule {
    fn name(&self) -> &str { "statement_body" }
    fn apply(&self, tree: &StepTree<'_>, _ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for node in tree.nodes().iter().filter(|n| n.def.is_statement()) {
            if node.def.steps.is_empty() {
                diags.push(
                    Diagnostic::new(
                        self.name(),
                        Severity::Warning,
                        format!("Statement {} has no nested steps", node.def.id),
                    )
                    .at(node.def.id, format!("{}.args.steps", node.path)),
                );
            }
            if node.def.raw_inputs.is_empty() {
                diags.push(
                    Diagnostic::new(
                        self.name(),
                        Severity::Warning,
                        format!("Statement {} has no inputs and will not iterate", node.def.id),
                    )
                    .at(node.def.id, format!("{}.args.input", node.path)),
                );
            }
        }
        diags
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all lint rules and return every diagnostic.
pub fn validate(pipeline: &PipelineDefinition, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(PositiveIdRule),
        Box::new(UniqueIdsRule),
        Box::new(KnownStepRule),
        Box::new(InstructionArgsRule),
        Box::new(InputSelectorsRule),
        Box::new(InputCountRule),
        Box::new(ArchiveTargetRule),
        Box::new(ReferencesExistRule),
        Box::new(OutputVisibilityRule),
        Box::new(DependencyCycleRule),
        Box::new(StatementBodyRule),
    ];

    let tree = StepTree::new(pipeline);
    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(&tree, ctx));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(
    pipeline: &PipelineDefinition,
    ctx: &ValidationContext<'_>,
) -> reelflow_types::Result<Vec<Diagnostic>> {
    let diagnostics = validate(pipeline, ctx);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.clone())
        .collect();
    if !errors.is_empty() {
        return Err(ReelflowError::ValidationError(errors.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::default_registry;

    fn check(json: &str) -> Vec<Diagnostic> {
        let pipeline = PipelineDefinition::from_json(json).unwrap();
        let registry = default_registry();
        let selectors = SelectorRegistry::builtin();
        validate(&pipeline, &ValidationContext::new(&registry, &selectors))
    }

    fn errors_of<'a>(diags: &'a [Diagnostic], rule: &str) -> Vec<&'a Diagnostic> {
        diags
            .iter()
            .filter(|d| d.rule == rule && d.severity == Severity::Error)
            .collect()
    }

    fn all_errors(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
        diags.iter().filter(|d| d.severity == Severity::Error).collect()
    }

    #[test]
    fn valid_pipeline_passes() {
        let diags = check(
            r#"{"steps": [
                {"id": 1, "type": "instruction", "name": "segment", "args": {"input": ["a.mp4"], "startTime": 5}},
                {"id": 2, "type": "instruction", "name": "speed", "args": {"input": ["@step-1:output"], "multiplier": 2},
                 "archive": {"filter": "videos"}}
            ]}"#,
        );
        assert!(all_errors(&diags).is_empty(), "Expected no errors, got: {diags:?}");
    }

    #[test]
    fn duplicate_ids_in_same_list() {
        let diags = check(
            r#"{"steps": [
                {"id": 1, "type": "instruction", "name": "segment", "args": {"input": ["a.mp4"], "startTime": 0}},
                {"id": 1, "type": "instruction", "name": "segment", "args": {"input": ["b.mp4"], "startTime": 0}}
            ]}"#,
        );
        let errs = errors_of(&diags, "unique_ids");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].step_id, Some(1));
        assert_eq!(errs[0].field.as_deref(), Some("steps"));
    }

    #[test]
    fn same_id_in_nested_scope_is_fine() {
        let diags = check(
            r#"{"steps": [
                {"id": 1, "type": "instruction", "name": "segment", "args": {"input": ["a.mp4"], "startTime": 0}},
                {"id": 2, "type": "statement", "name": "foreach", "args": {"input": ["@resources:videos"], "steps": [
                    {"id": 1, "type": "instruction", "name": "speed", "args": {"input": ["@parent:item"], "multiplier": 2}}
                ]}}
            ]}"#,
        );
        assert!(all_errors(&diags).is_empty(), "{diags:?}");
    }

    #[test]
    fn zero_id_and_unknown_name() {
        let diags = check(
            r#"{"steps": [{"id": 0, "type": "instruction", "name": "blur", "args": {"input": ["a.mp4"]}}]}"#,
        );
        assert_eq!(errors_of(&diags, "positive_id").len(), 1);
        let unknown = errors_of(&diags, "known_step");
        assert_eq!(unknown.len(), 1);
        assert!(unknown[0].fix.as_deref().unwrap().contains("segment"));
    }

    #[test]
    fn bad_args_are_reported_with_field() {
        let diags = check(
            r#"{"steps": [{"id": 4, "type": "instruction", "name": "speed", "args": {"input": ["a.mp4"], "multiplier": -1}}]}"#,
        );
        let errs = errors_of(&diags, "instruction_args");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field.as_deref(), Some("steps[0].args"));
    }

    #[test]
    fn malformed_and_instance_selectors_as_inputs() {
        let diags = check(
            r#"{"steps": [
                {"id": 1, "type": "instruction", "name": "speed", "args": {"input": ["@step-1:outputs"], "multiplier": 2}},
                {"id": 2, "type": "instruction", "name": "speed", "args": {"input": ["@step-1"], "multiplier": 2}},
                {"id": 3, "type": "instruction", "name": "speed", "args": {"input": ["../escape.mp4"], "multiplier": 2}}
            ]}"#,
        );
        let errs = errors_of(&diags, "input_selectors");
        assert_eq!(errs.len(), 3, "{errs:?}");
        assert_eq!(errs[0].field.as_deref(), Some("steps[0].args.input[0]"));
    }

    #[test]
    fn video_only_rejects_audio_literal() {
        let diags = check(
            r#"{"steps": [{"id": 1, "type": "instruction", "name": "resize", "args": {"input": ["song.mp3"], "width": 100}}]}"#,
        );
        assert_eq!(errors_of(&diags, "input_selectors").len(), 1);
    }

    #[test]
    fn literal_inputs_checked_against_input_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("here.mp4"), b"x").unwrap();
        let pipeline = PipelineDefinition::from_json(
            r#"{"steps": [
                {"id": 1, "type": "instruction", "name": "speed", "args": {"input": ["here.mp4"], "multiplier": 2}},
                {"id": 2, "type": "instruction", "name": "speed", "args": {"input": ["gone.mp4"], "multiplier": 2}}
            ]}"#,
        )
        .unwrap();
        let registry = default_registry();
        let selectors = SelectorRegistry::builtin();
        let ctx = ValidationContext::new(&registry, &selectors).with_input_dir(dir.path());
        let diags = validate(&pipeline, &ctx);
        let errs = errors_of(&diags, "input_selectors");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].step_id, Some(2));
    }

    #[test]
    fn too_many_literal_inputs() {
        let diags = check(
            r#"{"steps": [{"id": 1, "type": "instruction", "name": "speed", "args": {"input": ["a.mp4", "b.mp4"], "multiplier": 2}}]}"#,
        );
        assert_eq!(errors_of(&diags, "input_count").len(), 1);

        let diags = check(
            r#"{"steps": [{"id": 1, "type": "instruction", "name": "speed", "args": {"multiplier": 2}}]}"#,
        );
        assert_eq!(errors_of(&diags, "input_count").len(), 1);
    }

    #[test]
    fn archive_target_must_be_an_existing_step() {
        let diags = check(
            r#"{"steps": [
                {"id": 1, "type": "instruction", "name": "speed", "args": {"input": ["a.mp4"], "multiplier": 2},
                 "archive": {"target": "@step-2:output"}},
                {"id": 2, "type": "instruction", "name": "speed", "args": {"input": ["a.mp4"], "multiplier": 2},
                 "archive": {"target": "@step-9"}},
                {"id": 3, "type": "instruction", "name": "speed", "args": {"input": ["a.mp4"], "multiplier": 2},
                 "archive": {"target": "@parent"}}
            ]}"#,
        );
        let errs = errors_of(&diags, "archive_target");
        assert_eq!(errs.len(), 3, "{errs:?}");
        assert!(errs.iter().all(|d| d.field.as_deref().unwrap().ends_with("archive.target")));
    }

    #[test]
    fn missing_reference_and_stray_parent() {
        let diags = check(
            r#"{"steps": [
                {"id": 1, "type": "instruction", "name": "speed", "args": {"input": ["@step-5:output"], "multiplier": 2}},
                {"id": 2, "type": "instruction", "name": "speed", "args": {"input": ["@parent:item"], "multiplier": 2}}
            ]}"#,
        );
        let errs = errors_of(&diags, "references_exist");
        assert_eq!(errs.len(), 2);
        assert_eq!(errs[0].step_id, Some(1));
        assert_eq!(errs[1].step_id, Some(2));
    }

    #[test]
    fn reaching_into_another_statement_body() {
        let diags = check(
            r#"{"steps": [
                {"id": 1, "type": "statement", "name": "foreach", "args": {"input": ["@resources:videos"], "steps": [
                    {"id": 7, "type": "instruction", "name": "speed", "args": {"input": ["@parent:item"], "multiplier": 2}}
                ]}},
                {"id": 2, "type": "instruction", "name": "speed", "args": {"input": ["@step-7:output"], "multiplier": 2}}
            ]}"#,
        );
        let errs = errors_of(&diags, "output_visibility");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].step_id, Some(2));
    }

    #[test]
    fn nested_step_may_reference_outer_step() {
        let diags = check(
            r#"{"steps": [
                {"id": 1, "type": "instruction", "name": "segment", "args": {"input": ["a.mp4"], "startTime": 0}},
                {"id": 2, "type": "statement", "name": "foreach", "args": {"input": ["@resources:videos"], "steps": [
                    {"id": 3, "type": "instruction", "name": "speed", "args": {"input": ["@parent:item"], "multiplier": 2},
                     "archive": {"target": "@step-4"}},
                    {"id": 4, "type": "instruction", "name": "framerate", "args": {"input": ["@step-1:output"], "ips": 24}}
                ]}}
            ]}"#,
        );
        assert!(all_errors(&diags).is_empty(), "{diags:?}");
    }

    #[test]
    fn cycles_are_reported_once() {
        let diags = check(
            r#"{"steps": [
                {"id": 1, "type": "instruction", "name": "speed", "args": {"input": ["@step-2:output"], "multiplier": 2}},
                {"id": 2, "type": "instruction", "name": "speed", "args": {"input": ["@step-1:output"], "multiplier": 2}}
            ]}"#,
        );
        let errs = errors_of(&diags, "dependency_cycle");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].message, "Dependency cycle: step 1 -> step 2 -> step 1");
    }

    #[test]
    fn nested_step_waiting_on_its_statement_is_a_cycle() {
        let diags = check(
            r#"{"steps": [
                {"id": 1, "type": "statement", "name": "foreach", "args": {"input": ["@resources:videos"], "steps": [
                    {"id": 2, "type": "instruction", "name": "speed", "args": {"input": ["@step-1:output"], "multiplier": 2}}
                ]}}
            ]}"#,
        );
        assert_eq!(errors_of(&diags, "dependency_cycle").len(), 1);
    }

    #[test]
    fn empty_foreach_warns() {
        let diags = check(r#"{"steps": [{"id": 1, "type": "statement", "name": "foreach"}]}"#);
        let warnings: Vec<_> = diags
            .iter()
            .filter(|d| d.rule == "statement_body" && d.severity == Severity::Warning)
            .collect();
        assert_eq!(warnings.len(), 2);
        assert!(all_errors(&diags).is_empty());
    }

    #[test]
    fn validate_or_raise_joins_errors() {
        let pipeline = PipelineDefinition::from_json(
            r#"{"steps": [
                {"id": 1, "type": "instruction", "name": "blur"},
                {"id": 1, "type": "instruction", "name": "blur"}
            ]}"#,
        )
        .unwrap();
        let registry = default_registry();
        let selectors = SelectorRegistry::builtin();
        let err = validate_or_raise(&pipeline, &ValidationContext::new(&registry, &selectors)).unwrap_err();
        match err {
            ReelflowError::ValidationError(message) => {
                assert!(message.contains("Step id 1 is used 2 times"), "{message}");
                assert!(message.contains("unknown instruction 'blur'"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
