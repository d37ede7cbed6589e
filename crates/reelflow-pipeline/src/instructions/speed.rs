use std::path::PathBuf;

use async_trait::async_trait;
use reelflow_media::TranscodeJob;
use reelflow_types::{extension_of, MediaKind, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::handler::{parse_args, Instruction, InstructionArgs, InstructionContext};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpeedArgs {
    /// 2.0 plays twice as fast, 0.5 half as fast.
    pub multiplier: f64,
}

impl InstructionArgs for SpeedArgs {
    fn check(&self) -> std::result::Result<(), String> {
        if self.multiplier <= 0.0 {
            return Err("multiplier must be greater than 0".into());
        }
        Ok(())
    }
}

/// `atempo` only accepts factors in `[0.5, 2]`, so larger changes are
/// chained.
pub fn atempo_chain(multiplier: f64) -> Vec<String> {
    let mut filters = Vec::new();
    let mut remaining = multiplier;
    while remaining > 2.0 {
        filters.push("atempo=2".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        filters.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    filters.push(format!("atempo={remaining}"));
    filters
}

/// Change playback speed. Works on audio files too.
pub struct Speed;

#[async_trait]
impl Instruction for Speed {
    fn name(&self) -> &str {
        "speed"
    }

    fn validate_args(&self, args: &Value) -> std::result::Result<(), String> {
        parse_args::<SpeedArgs>(args).map(|_| ())
    }

    async fn process(&self, ctx: &InstructionContext<'_>) -> Result<Vec<PathBuf>> {
        let args: SpeedArgs = ctx.args()?;
        let input = ctx.single_input()?;
        if args.multiplier == 1.0 {
            return Ok(vec![input.to_path_buf()]);
        }

        let ext = extension_of(input).unwrap_or_else(|| "mp4".into());
        let output = ctx
            .output_dir
            .join(format!("{}-speed-output.{ext}", ctx.step_id));
        let mut job = TranscodeJob::new(input, output);
        if MediaKind::of(input) != Some(MediaKind::Audio) {
            job = job.video_filter(format!("setpts={}*PTS", 1.0 / args.multiplier));
        }
        for filter in atempo_chain(args.multiplier) {
            job = job.audio_filter(filter);
        }
        Ok(vec![ctx.engine.transcode(&job).await?])
    }
}
