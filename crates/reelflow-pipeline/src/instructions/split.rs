use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use reelflow_media::TranscodeJob;
use reelflow_types::{ReelflowError, Result};
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinSet;

use crate::handler::{parse_args, Instruction, InstructionArgs, InstructionContext};

/// Cut a video into consecutive parts, either of a given length or a given
/// count.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SplitArgs {
    #[serde(default)]
    pub segment_duration: Option<u64>,
    #[serde(default)]
    pub nb_segments: Option<u64>,
}

impl InstructionArgs for SplitArgs {
    fn check(&self) -> std::result::Result<(), String> {
        match (self.segment_duration, self.nb_segments) {
            (None, None) => Err("either segmentDuration or nbSegments is required".into()),
            (Some(0), _) => Err("segmentDuration must be greater than 0".into()),
            (_, Some(0)) => Err("nbSegments must be greater than 0".into()),
            _ => Ok(()),
        }
    }
}

impl SplitArgs {
    /// `(count, length)` of the parts for a video of `total` seconds.
    /// `segmentDuration` wins when both are given.
    pub fn plan(&self, total: u64) -> (u64, u64) {
        match (self.segment_duration, self.nb_segments) {
            (Some(length), _) => (total.div_ceil(length), length),
            (None, Some(count)) => (count, total.div_ceil(count)),
            (None, None) => (0, 0),
        }
    }
}

pub struct Split;

#[async_trait]
impl Instruction for Split {
    fn name(&self) -> &str {
        "split"
    }

    fn validate_args(&self, args: &Value) -> std::result::Result<(), String> {
        parse_args::<SplitArgs>(args).map(|_| ())
    }

    fn video_only(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &InstructionContext<'_>) -> Result<Vec<PathBuf>> {
        let args: SplitArgs = ctx.args()?;
        let input = ctx.single_input()?;

        let total = ctx
            .engine
            .probe_duration(input)
            .await?
            .ok_or_else(|| ReelflowError::ToolError {
                tool: ctx.engine.name().to_string(),
                message: format!("could not determine the duration of {}", input.display()),
            })?
            .round() as u64;
        let (count, length) = args.plan(total);
        if count == 0 || length == 0 {
            return Err(ctx.invalid_args(format!("a {total}s input cannot be split")));
        }
        tracing::debug!(step = ctx.step_id, total, count, length, "Splitting");

        let mut tasks = JoinSet::new();
        for i in 0..count {
            let job = TranscodeJob::new(input, ctx.indexed_output_path(i as usize + 1))
                .input_option("-ss", i * length)
                .input_option("-t", length);
            let engine = Arc::clone(ctx.engine);
            tasks.spawn(async move { (i, engine.transcode(&job).await) });
        }

        let mut parts: Vec<Option<PathBuf>> = vec![None; count as usize];
        while let Some(joined) = tasks.join_next().await {
            let (i, result) = joined.map_err(|e| ReelflowError::ToolError {
                tool: ctx.engine.name().to_string(),
                message: format!("split job failed: {e}"),
            })?;
            parts[i as usize] = Some(result?);
        }
        Ok(parts.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::testing;
    use reelflow_media::DryRunEngine;
    use serde_json::json;

    #[test]
    fn plan_from_segment_duration() {
        let args = SplitArgs {
            segment_duration: Some(10),
            nb_segments: None,
        };
        assert_eq!(args.plan(25), (3, 10));
        assert_eq!(args.plan(30), (3, 10));
    }

    #[test]
    fn plan_from_segment_count() {
        let args = SplitArgs {
            segment_duration: None,
            nb_segments: Some(4),
        };
        assert_eq!(args.plan(10), (4, 3));
    }

    #[tokio::test]
    async fn parts_are_ordered_and_seek_forward() {
        let engine = DryRunEngine::new().with_duration("in.mp4", 24.6);
        let (_dir, result, jobs) =
            testing::run(&Split, "in.mp4", json!({"segmentDuration": 10}), engine).await;

        let files = result.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["7-split-output-1.mp4", "7-split-output-2.mp4", "7-split-output-3.mp4"]
        );

        let mut seeks: Vec<_> = jobs.iter().map(|j| j.input_options[1].clone()).collect();
        seeks.sort();
        assert_eq!(seeks, vec!["0", "10", "20"]);
    }

    #[tokio::test]
    async fn unknown_duration_is_an_error() {
        let (_dir, result, jobs) =
            testing::run(&Split, "in.mp4", json!({"nbSegments": 2}), DryRunEngine::new()).await;
        assert!(matches!(result, Err(ReelflowError::ToolError { .. })));
        assert!(jobs.is_empty());
    }

    #[test]
    fn needs_one_of_the_two() {
        assert!(Split.validate_args(&json!({})).is_err());
        assert!(Split.validate_args(&json!({"nbSegments": 0})).is_err());
        assert!(Split.validate_args(&json!({"nbSegments": 3})).is_ok());
    }
}
