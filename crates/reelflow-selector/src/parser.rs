use winnow::ascii::{digit1, space0};
use winnow::combinator::{alt, eof, preceded, separated};
use winnow::error::{ContextError, ErrMode};
use winnow::token::take_while;
use winnow::{ModalResult, Parser};

use reelflow_types::{is_known_extension, MediaFilter, ReelflowError, Result};

use crate::ast::*;
use crate::registry::SelectorSpec;

// ---------------------------------------------------------------------------
// Selector heads
// ---------------------------------------------------------------------------

/// A head must be followed by a parameter separator or the end of input.
fn head_end(input: &mut &str) -> ModalResult<()> {
    alt((':'.void(), eof.void())).parse_next(input)
}

/// `@step-<digits>` followed by `:` or end.
pub(crate) fn is_step_head(input: &str) -> bool {
    let mut rest = input;
    ("@step-", digit1, head_end).parse_next(&mut rest).is_ok()
}

pub(crate) fn is_parent_head(input: &str) -> bool {
    keyword_head(input, "@parent")
}

pub(crate) fn is_resources_head(input: &str) -> bool {
    keyword_head(input, "@resources")
}

fn keyword_head(input: &str, keyword: &'static str) -> bool {
    let mut rest = input;
    (keyword, head_end).parse_next(&mut rest).is_ok()
}

// ---------------------------------------------------------------------------
// Token grammar
// ---------------------------------------------------------------------------

fn number(input: &mut &str) -> ModalResult<u64> {
    let digits: &str = digit1.parse_next(input)?;
    digits
        .parse()
        .map_err(|_| ErrMode::Backtrack(ContextError::new()))
}

fn step_id(input: &mut &str) -> ModalResult<u32> {
    let digits: &str = preceded("step-", digit1).parse_next(input)?;
    digits
        .parse()
        .map_err(|_| ErrMode::Backtrack(ContextError::new()))
}

fn comparator(input: &mut &str) -> ModalResult<Comparator> {
    // Two-character operators first so `<=` is not read as `<`.
    alt((
        "<=".value(Comparator::Le),
        ">=".value(Comparator::Ge),
        "<".value(Comparator::Lt),
        ">".value(Comparator::Gt),
        "=".value(Comparator::Eq),
    ))
    .parse_next(input)
}

fn duration(input: &mut &str) -> ModalResult<DurationFilter> {
    let _ = "duration".parse_next(input)?;
    let comparator = comparator.parse_next(input)?;
    let _ = space0.parse_next(input)?;
    let seconds = number.parse_next(input)?;
    Ok(DurationFilter {
        comparator,
        seconds,
    })
}

fn extension_list<'i>(input: &mut &'i str) -> ModalResult<Vec<&'i str>> {
    separated(
        1..,
        take_while(1.., |c: char| c.is_ascii_alphanumeric()),
        ',',
    )
    .parse_next(input)
}

fn filename_pattern<'i>(input: &mut &'i str) -> ModalResult<(PatternMode, &'i str)> {
    let mode = alt((
        "startwith".value(PatternMode::StartsWith),
        "endwith".value(PatternMode::EndsWith),
        "contains".value(PatternMode::Contains),
    ))
    .parse_next(input)?;
    let _ = '='.parse_next(input)?;
    let needle = take_while(1.., |c: char| c.is_alphanumeric() || c == '_' || c == '-')
        .parse_next(input)?;
    Ok((mode, needle))
}

/// Run `parser` over the whole token; trailing input means no match.
fn whole<'i, O>(
    token: &'i str,
    mut parser: impl Parser<&'i str, O, ErrMode<ContextError>>,
) -> Option<O> {
    let mut rest = token;
    let out = parser.parse_next(&mut rest).ok()?;
    rest.is_empty().then_some(out)
}

// ---------------------------------------------------------------------------
// Token parsers, one per recognizable parameter
// ---------------------------------------------------------------------------

pub(crate) fn parse_step_id(token: &str) -> Option<Param> {
    whole(token, step_id).map(Param::StepId)
}

pub(crate) fn parse_output_tag(token: &str) -> Option<Param> {
    (token == "output").then_some(Param::Element(Element::Output))
}

pub(crate) fn parse_item_tag(token: &str) -> Option<Param> {
    (token == "item").then_some(Param::Element(Element::Item))
}

pub(crate) fn parse_file_type(token: &str) -> Option<Param> {
    MediaFilter::parse(token).map(Param::FileType)
}

pub(crate) fn parse_extensions(token: &str) -> Option<Param> {
    let exts = whole(token, extension_list)?;
    if !exts.iter().all(|e| is_known_extension(e)) {
        return None;
    }
    Some(Param::Extensions(
        exts.into_iter().map(|e| e.to_ascii_lowercase()).collect(),
    ))
}

pub(crate) fn parse_duration(token: &str) -> Option<Param> {
    whole(token, duration).map(Param::Duration)
}

pub(crate) fn parse_filename_pattern(token: &str) -> Option<Param> {
    let (mode, needle) = whole(token, filename_pattern)?;
    FilenamePattern::new(mode, needle)
        .ok()
        .map(Param::FilenamePattern)
}

// ---------------------------------------------------------------------------
// Selector parsing
// ---------------------------------------------------------------------------

/// Parse `input` against a matched kind spec.
pub(crate) fn parse_with(spec: &SelectorSpec, input: &str) -> Result<Selector> {
    let syntax = |message: String| ReelflowError::SelectorSyntax {
        selector: input.to_string(),
        message,
    };

    let body = input.strip_prefix('@').unwrap_or(input);
    let mut sections = body.split(':');
    let name = sections.next().unwrap_or_default();
    // Empty sections (`@resources:videos:`) are skipped.
    let tokens: Vec<&str> = sections.filter(|t| !t.is_empty()).collect();

    if tokens.len() < spec.min_params {
        return Err(syntax(format!(
            "expects at least {} parameter(s), got {}",
            spec.min_params,
            tokens.len()
        )));
    }
    if let Some(max) = spec.max_params.filter(|max| tokens.len() > *max) {
        return Err(syntax(format!(
            "expects at most {} parameter(s), got {}",
            max,
            tokens.len()
        )));
    }

    let named = spec.include_name.then_some(name);
    let mut params = ParamBundle::default();
    for token in named.into_iter().chain(tokens) {
        let param = spec
            .parsers
            .iter()
            .find_map(|parse| parse(token))
            .ok_or_else(|| syntax(format!("parameter '{token}' is not valid")))?;
        params
            .insert(param)
            .map_err(|key| syntax(format!("parameter '{key}' can only be given once")))?;
    }

    for (a, b) in spec.exclusive {
        if params.contains(*a) && params.contains(*b) {
            return Err(syntax(format!("'{a}' and '{b}' cannot be combined")));
        }
    }

    let target = SelectorTarget::from_params(spec.kind, &params).map_err(syntax)?;
    tracing::trace!(selector = input, kind = spec.kind.as_str(), "Parsed selector");

    Ok(Selector {
        raw: input.to_string(),
        kind: spec.kind,
        params,
        target,
    })
}
