use std::path::PathBuf;

use async_trait::async_trait;
use reelflow_media::TranscodeJob;
use reelflow_types::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::handler::{parse_args, Instruction, InstructionArgs, InstructionContext};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FramerateArgs {
    /// Images per second of the output.
    pub ips: f64,
}

impl InstructionArgs for FramerateArgs {
    fn check(&self) -> std::result::Result<(), String> {
        if self.ips <= 0.0 {
            return Err("ips must be greater than 0".into());
        }
        Ok(())
    }
}

pub struct Framerate;

#[async_trait]
impl Instruction for Framerate {
    fn name(&self) -> &str {
        "framerate"
    }

    fn validate_args(&self, args: &Value) -> std::result::Result<(), String> {
        parse_args::<FramerateArgs>(args).map(|_| ())
    }

    fn video_only(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &InstructionContext<'_>) -> Result<Vec<PathBuf>> {
        let args: FramerateArgs = ctx.args()?;
        let job = TranscodeJob::new(ctx.single_input()?, ctx.output_path()).output_option("-r", args.ips);
        Ok(vec![ctx.engine.transcode(&job).await?])
    }
}
