use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use regex::Regex;
use reelflow_types::MediaFilter;

use crate::filter::ResourceFilter;

/// The three selector families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorKind {
    Step,
    Parent,
    Resources,
}

impl SelectorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectorKind::Step => "step",
            SelectorKind::Parent => "parent",
            SelectorKind::Resources => "resources",
        }
    }
}

/// What a selector yields once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorOutput {
    /// A reference to a live step. Only legal as an archive target.
    StepInstance,
    /// A lazily produced list of files. Only legal as a step input.
    Content,
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamKey {
    TargetId,
    Element,
    FileType,
    Extensions,
    Duration,
    FilenamePattern,
}

impl ParamKey {
    /// Array keys accumulate; every other key may appear once.
    pub fn is_array(self) -> bool {
        matches!(self, ParamKey::FilenamePattern)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamKey::TargetId => "target_id",
            ParamKey::Element => "element",
            ParamKey::FileType => "file_type",
            ParamKey::Extensions => "extensions",
            ParamKey::Duration => "duration",
            ParamKey::FilenamePattern => "filename_pattern",
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-element tags: `:output` on step selectors, `:item` on parent selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Output,
    Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Comparator {
    pub fn compare(self, value: u64, target: u64) -> bool {
        match self {
            Comparator::Lt => value < target,
            Comparator::Le => value <= target,
            Comparator::Eq => value == target,
            Comparator::Ge => value >= target,
            Comparator::Gt => value > target,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Eq => "=",
            Comparator::Ge => ">=",
            Comparator::Gt => ">",
        }
    }
}

/// `duration<op><seconds>`; durations are rounded to whole seconds before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationFilter {
    pub comparator: Comparator,
    pub seconds: u64,
}

impl DurationFilter {
    pub fn matches(&self, duration_secs: f64) -> bool {
        let rounded = duration_secs.round();
        if !rounded.is_finite() || rounded < 0.0 {
            return false;
        }
        self.comparator.compare(rounded as u64, self.seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMode {
    StartsWith,
    EndsWith,
    Contains,
}

impl PatternMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternMode::StartsWith => "startwith",
            PatternMode::EndsWith => "endwith",
            PatternMode::Contains => "contains",
        }
    }
}

/// A filename pattern, matched against the file stem (name without extension).
#[derive(Debug, Clone)]
pub struct FilenamePattern {
    mode: PatternMode,
    needle: String,
    regex: Regex,
}

impl FilenamePattern {
    pub fn new(mode: PatternMode, needle: &str) -> Result<Self, regex::Error> {
        let escaped = regex::escape(needle);
        let source = match mode {
            PatternMode::StartsWith => format!("^{escaped}"),
            PatternMode::EndsWith => format!("{escaped}$"),
            PatternMode::Contains => escaped,
        };
        Ok(Self {
            mode,
            needle: needle.to_string(),
            regex: Regex::new(&source)?,
        })
    }

    pub fn mode(&self) -> PatternMode {
        self.mode
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }

    pub fn is_match(&self, path: &Path) -> bool {
        path.file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| self.regex.is_match(stem))
    }
}

impl PartialEq for FilenamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode && self.needle == other.needle
    }
}

/// One parsed selector token.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    StepId(u32),
    Element(Element),
    FileType(MediaFilter),
    Extensions(Vec<String>),
    Duration(DurationFilter),
    FilenamePattern(FilenamePattern),
}

impl Param {
    pub fn key(&self) -> ParamKey {
        match self {
            Param::StepId(_) => ParamKey::TargetId,
            Param::Element(_) => ParamKey::Element,
            Param::FileType(_) => ParamKey::FileType,
            Param::Extensions(_) => ParamKey::Extensions,
            Param::Duration(_) => ParamKey::Duration,
            Param::FilenamePattern(_) => ParamKey::FilenamePattern,
        }
    }
}

/// Canonical token text; parsing it yields an equal `Param`.
impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::StepId(id) => write!(f, "step-{id}"),
            Param::Element(Element::Output) => f.write_str("output"),
            Param::Element(Element::Item) => f.write_str("item"),
            Param::FileType(filter) => f.write_str(filter.as_str()),
            Param::Extensions(exts) => f.write_str(&exts.join(",")),
            Param::Duration(d) => write!(f, "duration{}{}", d.comparator.as_str(), d.seconds),
            Param::FilenamePattern(p) => write!(f, "{}={}", p.mode.as_str(), p.needle),
        }
    }
}

/// Parameters of one selector, keyed by [`ParamKey`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamBundle {
    entries: BTreeMap<ParamKey, Vec<Param>>,
}

impl ParamBundle {
    /// Add a parameter. Returns the key back as the error when a non-array
    /// key is already present.
    pub fn insert(&mut self, param: Param) -> Result<(), ParamKey> {
        let key = param.key();
        let slot = self.entries.entry(key).or_default();
        if !slot.is_empty() && !key.is_array() {
            return Err(key);
        }
        slot.push(param);
        Ok(())
    }

    pub fn get(&self, key: ParamKey) -> Option<&Param> {
        self.entries.get(&key).and_then(|v| v.first())
    }

    pub fn get_all(&self, key: ParamKey) -> &[Param] {
        self.entries.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: ParamKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.entries.values().flatten()
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Typed view of what a selector points at.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorTarget {
    Step { id: u32, output: bool },
    Parent { item: bool },
    Resources(ResourceFilter),
}

impl SelectorTarget {
    pub(crate) fn from_params(kind: SelectorKind, params: &ParamBundle) -> Result<Self, String> {
        match kind {
            SelectorKind::Step => {
                let id = match params.get(ParamKey::TargetId) {
                    Some(Param::StepId(id)) => *id,
                    _ => return Err("missing step id".into()),
                };
                let output = matches!(
                    params.get(ParamKey::Element),
                    Some(Param::Element(Element::Output))
                );
                Ok(SelectorTarget::Step { id, output })
            }
            SelectorKind::Parent => Ok(SelectorTarget::Parent {
                item: matches!(
                    params.get(ParamKey::Element),
                    Some(Param::Element(Element::Item))
                ),
            }),
            SelectorKind::Resources => Ok(SelectorTarget::Resources(ResourceFilter::from_params(
                params,
            ))),
        }
    }
}

/// A parsed selector expression. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub(crate) raw: String,
    pub(crate) kind: SelectorKind,
    pub(crate) params: ParamBundle,
    pub(crate) target: SelectorTarget,
}

impl Selector {
    /// Parse with the built-in selector registry.
    pub fn parse(input: &str) -> reelflow_types::Result<Self> {
        crate::SelectorRegistry::builtin().parse(input)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> SelectorKind {
        self.kind
    }

    pub fn params(&self) -> &ParamBundle {
        &self.params
    }

    pub fn target(&self) -> &SelectorTarget {
        &self.target
    }

    pub fn expected_output(&self) -> SelectorOutput {
        match &self.target {
            SelectorTarget::Step { output: true, .. } | SelectorTarget::Parent { item: true } => {
                SelectorOutput::Content
            }
            SelectorTarget::Step { .. } | SelectorTarget::Parent { .. } => {
                SelectorOutput::StepInstance
            }
            SelectorTarget::Resources(_) => SelectorOutput::Content,
        }
    }

    /// The step id this selector names, for `@step-N` selectors.
    pub fn step_id(&self) -> Option<u32> {
        match self.target {
            SelectorTarget::Step { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Render the parameter bundle back to selector text.
    pub fn canonical(&self) -> String {
        let mut out = String::from("@");
        match self.kind {
            SelectorKind::Step => {
                let mut first = true;
                for param in self.params.iter() {
                    if !first {
                        out.push(':');
                    }
                    first = false;
                    out.push_str(&param.to_string());
                }
            }
            kind => {
                out.push_str(kind.as_str());
                for param in self.params.iter() {
                    out.push(':');
                    out.push_str(&param.to_string());
                }
            }
        }
        out
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Returns `true` if `input` is written in selector syntax.
pub fn is_selector(input: &str) -> bool {
    input.starts_with('@')
}
