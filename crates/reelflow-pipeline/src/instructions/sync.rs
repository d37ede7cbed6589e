use std::path::PathBuf;

use async_trait::async_trait;
use reelflow_media::TranscodeJob;
use reelflow_types::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::handler::{parse_args, Instruction, InstructionArgs, InstructionContext};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncArgs {
    /// Seconds. Positive delays the audio, otherwise the video is delayed.
    pub delay: f64,
}

impl InstructionArgs for SyncArgs {}

/// Shift audio against video to fix a lip-sync offset.
pub struct AudioSync;

impl AudioSync {
    fn job(ctx: &InstructionContext<'_>, delay: f64) -> Result<TranscodeJob> {
        let job = TranscodeJob::new(ctx.single_input()?, ctx.output_path());
        Ok(if delay > 0.0 {
            let ms = delay * 1000.0;
            job.audio_filter(format!("adelay={ms}|{ms}"))
        } else {
            job.video_filter(format!("setpts=PTS+{}/TB", delay.abs()))
        })
    }
}

#[async_trait]
impl Instruction for AudioSync {
    fn name(&self) -> &str {
        "sync"
    }

    fn validate_args(&self, args: &Value) -> std::result::Result<(), String> {
        parse_args::<SyncArgs>(args).map(|_| ())
    }

    fn video_only(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &InstructionContext<'_>) -> Result<Vec<PathBuf>> {
        let args: SyncArgs = ctx.args()?;
        let job = Self::job(ctx, args.delay)?;
        Ok(vec![ctx.engine.transcode(&job).await?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::testing;
    use reelflow_media::DryRunEngine;
    use serde_json::json;

    #[tokio::test]
    async fn positive_delay_moves_audio() {
        let (_dir, result, jobs) =
            testing::run(&AudioSync, "in.mp4", json!({"delay": 1.5}), DryRunEngine::new()).await;
        assert!(result.unwrap()[0].ends_with("7-sync-output.mp4"));
        assert_eq!(jobs[0].audio_filters, vec!["adelay=1500|1500"]);
        assert!(jobs[0].video_filters.is_empty());
    }

    #[tokio::test]
    async fn negative_delay_moves_video() {
        let (_dir, _, jobs) =
            testing::run(&AudioSync, "in.mp4", json!({"delay": -0.25}), DryRunEngine::new()).await;
        assert_eq!(jobs[0].video_filters, vec!["setpts=PTS+0.25/TB"]);
        assert!(jobs[0].audio_filters.is_empty());
    }

    #[test]
    fn delay_is_required() {
        assert!(AudioSync.validate_args(&json!({})).is_err());
        assert!(AudioSync.validate_args(&json!({"delay": "soon"})).is_err());
    }
}
