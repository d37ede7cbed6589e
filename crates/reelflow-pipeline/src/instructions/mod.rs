//! Built-in media instructions.
//!
//! Every instruction takes one input file, builds one or more
//! [`TranscodeJob`](reelflow_media::TranscodeJob)s from its typed args, and
//! returns the files the engine produced.

pub mod framerate;
pub mod resize;
pub mod segment;
pub mod speed;
pub mod split;
pub mod sync;

pub use framerate::{Framerate, FramerateArgs};
pub use resize::{Pad, Resize, ResizeArgs};
pub use segment::{Segment, SegmentArgs};
pub use speed::{Speed, SpeedArgs};
pub use split::{Split, SplitArgs};
pub use sync::{AudioSync, SyncArgs};
