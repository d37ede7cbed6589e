use std::path::PathBuf;

use reelflow_types::{filter_by_extensions, MediaFilter};

use crate::ast::{DurationFilter, FilenamePattern, Param, ParamBundle};

/// Filters carried by a `@resources` selector.
///
/// File type and extension filters never coexist; the parser rejects that
/// combination.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceFilter {
    pub file_type: Option<MediaFilter>,
    pub extensions: Option<Vec<String>>,
    pub duration: Option<DurationFilter>,
    pub patterns: Vec<FilenamePattern>,
}

impl ResourceFilter {
    pub(crate) fn from_params(params: &ParamBundle) -> Self {
        let mut filter = ResourceFilter::default();
        for param in params.iter() {
            match param {
                Param::FileType(t) => filter.file_type = Some(*t),
                Param::Extensions(e) => filter.extensions = Some(e.clone()),
                Param::Duration(d) => filter.duration = Some(*d),
                Param::FilenamePattern(p) => filter.patterns.push(p.clone()),
                Param::StepId(_) | Param::Element(_) => {}
            }
        }
        filter
    }

    /// Apply every filter that does not need to probe the files: file type or
    /// extensions first, then the filename patterns. Input order is kept.
    pub fn apply_static(&self, files: &[PathBuf]) -> Vec<PathBuf> {
        let mut kept = match (&self.file_type, &self.extensions) {
            (Some(file_type), _) => file_type.apply(files),
            (None, Some(exts)) => filter_by_extensions(files, exts),
            (None, None) => files.to_vec(),
        };
        kept.retain(|file| self.patterns.iter().all(|p| p.is_match(file)));
        kept
    }

    /// Whether resolution must probe durations after [`apply_static`](Self::apply_static).
    pub fn needs_probe(&self) -> bool {
        self.duration.is_some()
    }
}
