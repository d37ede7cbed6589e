use std::path::PathBuf;

use async_trait::async_trait;
use reelflow_media::TranscodeJob;
use reelflow_types::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::handler::{parse_args, Instruction, InstructionArgs, InstructionContext};

/// Cut a clip out of a video.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SegmentArgs {
    /// Offset of the clip in seconds.
    pub start_time: f64,
    /// Length of the clip in seconds. Runs to the end when absent.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl InstructionArgs for SegmentArgs {
    fn check(&self) -> std::result::Result<(), String> {
        if self.start_time < 0.0 {
            return Err("startTime must be positive or zero".into());
        }
        if self.duration.is_some_and(|d| d <= 0.0) {
            return Err("duration must be greater than 0".into());
        }
        Ok(())
    }
}

pub struct Segment;

#[async_trait]
impl Instruction for Segment {
    fn name(&self) -> &str {
        "segment"
    }

    fn validate_args(&self, args: &Value) -> std::result::Result<(), String> {
        parse_args::<SegmentArgs>(args).map(|_| ())
    }

    fn video_only(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &InstructionContext<'_>) -> Result<Vec<PathBuf>> {
        let args: SegmentArgs = ctx.args()?;
        let mut job = TranscodeJob::new(ctx.single_input()?, ctx.output_path())
            .input_option("-ss", args.start_time);
        if let Some(duration) = args.duration {
            job = job.input_option("-t", duration);
        }
        Ok(vec![ctx.engine.transcode(&job).await?])
    }
}
