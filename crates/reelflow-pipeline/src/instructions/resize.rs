use std::path::PathBuf;

use async_trait::async_trait;
use reelflow_media::TranscodeJob;
use reelflow_types::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::handler::{parse_args, Instruction, InstructionArgs, InstructionContext};

/// Letterboxing: on/off, or on with a colour.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Pad {
    Enabled(bool),
    Color(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResizeArgs {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Scale factor applied to both sides. Takes precedence over width and
    /// height.
    #[serde(default)]
    pub ratio: Option<f64>,
    /// Display aspect ratio, `W:H`.
    #[serde(default)]
    pub aspect: Option<String>,
    #[serde(default)]
    pub pad: Option<Pad>,
}

impl InstructionArgs for ResizeArgs {
    fn check(&self) -> std::result::Result<(), String> {
        if self.width.is_none() && self.height.is_none() && self.ratio.is_none() {
            return Err("one of width, height or ratio is required".into());
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err("width and height must be greater than 0".into());
        }
        if let Some(ratio) = self.ratio {
            if ratio <= 0.0 || ratio > 10.0 {
                return Err("ratio must be greater than 0 and at most 10".into());
            }
        }
        if let Some(aspect) = &self.aspect {
            if !is_aspect_ratio(aspect) {
                return Err(format!("aspect '{aspect}' is not of the form W:H"));
            }
        }
        if let Some(Pad::Color(color)) = &self.pad {
            let valid = !color.is_empty()
                && color
                    .trim_start_matches('#')
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric());
            if !valid {
                return Err(format!("pad colour '{color}' is not valid"));
            }
        }
        Ok(())
    }
}

impl ResizeArgs {
    fn pad_color(&self) -> Option<&str> {
        match &self.pad {
            None | Some(Pad::Enabled(true)) => Some("black"),
            Some(Pad::Enabled(false)) => None,
            Some(Pad::Color(color)) => Some(color.as_str()),
        }
    }

    /// The video filters for this resize.
    pub fn filters(&self) -> Vec<String> {
        if let Some(ratio) = self.ratio {
            return vec![format!("scale=iw*{ratio}:ih*{ratio}")];
        }
        match (self.width, self.height) {
            (Some(w), Some(h)) => match self.pad_color() {
                Some(color) => vec![
                    format!("scale={w}:{h}:force_original_aspect_ratio=decrease"),
                    format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:{color}"),
                ],
                None => vec![format!("scale={w}:{h}")],
            },
            (Some(w), None) => vec![format!("scale={w}:-2")],
            (None, Some(h)) => vec![format!("scale=-2:{h}")],
            (None, None) => Vec::new(),
        }
    }
}

fn is_aspect_ratio(value: &str) -> bool {
    let positive = |s: &str| s.parse::<f64>().is_ok_and(|n| n > 0.0);
    matches!(value.split_once(':'), Some((w, h)) if positive(w) && positive(h))
}

/// Scale a video, optionally padding to the exact box.
pub struct Resize;

#[async_trait]
impl Instruction for Resize {
    fn name(&self) -> &str {
        "resize"
    }

    fn validate_args(&self, args: &Value) -> std::result::Result<(), String> {
        parse_args::<ResizeArgs>(args).map(|_| ())
    }

    fn video_only(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &InstructionContext<'_>) -> Result<Vec<PathBuf>> {
        let args: ResizeArgs = ctx.args()?;
        let mut job = TranscodeJob::new(ctx.single_input()?, ctx.output_path());
        for filter in args.filters() {
            job = job.video_filter(filter);
        }
        if let Some(aspect) = &args.aspect {
            job = job.output_option("-aspect", aspect);
        }
        Ok(vec![ctx.engine.transcode(&job).await?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::testing;
    use reelflow_media::DryRunEngine;
    use serde_json::json;

    fn args(value: Value) -> ResizeArgs {
        parse_args(&value).unwrap()
    }

    #[test]
    fn box_is_padded_black_by_default() {
        assert_eq!(
            args(json!({"width": 1280, "height": 720})).filters(),
            vec![
                "scale=1280:720:force_original_aspect_ratio=decrease",
                "pad=1280:720:(ow-iw)/2:(oh-ih)/2:black"
            ]
        );
        assert_eq!(
            args(json!({"width": 1280, "height": 720, "pad": "#ff0000"})).filters()[1],
            "pad=1280:720:(ow-iw)/2:(oh-ih)/2:#ff0000"
        );
        assert_eq!(
            args(json!({"width": 1280, "height": 720, "pad": false})).filters(),
            vec!["scale=1280:720"]
        );
    }

    #[test]
    fn single_side_keeps_aspect() {
        assert_eq!(args(json!({"width": 640})).filters(), vec!["scale=640:-2"]);
        assert_eq!(args(json!({"height": 480})).filters(), vec!["scale=-2:480"]);
        assert_eq!(args(json!({"ratio": 0.5, "width": 10})).filters(), vec!["scale=iw*0.5:ih*0.5"]);
    }

    #[test]
    fn rejects_bad_args() {
        assert!(Resize.validate_args(&json!({})).is_err());
        assert!(Resize.validate_args(&json!({"ratio": 11})).is_err());
        assert!(Resize.validate_args(&json!({"width": 100, "aspect": "wide"})).is_err());
        assert!(Resize.validate_args(&json!({"width": 100, "pad": "no color"})).is_err());
        assert!(Resize.validate_args(&json!({"width": 100, "aspect": "16:9"})).is_ok());
    }

    #[tokio::test]
    async fn aspect_is_an_output_option() {
        let (_dir, result, jobs) = testing::run(
            &Resize,
            "in.mp4",
            json!({"width": 640, "aspect": "4:3"}),
            DryRunEngine::new(),
        )
        .await;
        assert!(result.unwrap()[0].ends_with("7-resize-output.mp4"));
        assert_eq!(jobs[0].output_options, vec!["-aspect", "4:3"]);
    }
}
