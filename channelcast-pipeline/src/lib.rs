//! Transcoding pipeline compiler for channelcast.
//!
//! Turns probed stream descriptors, a [`TranscodeRequest`] and a hardware
//! capability snapshot into the exact ordered argument list for one ffmpeg
//! invocation.
//!
//! # Example
//!
//! ```
//! use channelcast_core::{FrameSize, SoftwareFormat, VideoCodec, VideoStream};
//! use channelcast_pipeline::{MediaInput, PipelineBuilder, TranscodeRequest, VideoOutputSpec};
//!
//! let input = MediaInput::new("/media/movie.mkv").with_video(
//!     VideoStream::new(0, VideoCodec::H264, FrameSize::new(1920, 1080))
//!         .with_pixel_format(SoftwareFormat::Yuv420p),
//! );
//! let request = TranscodeRequest::video_only(
//!     VideoOutputSpec::new(VideoCodec::H264).with_frame_size(1280, 720),
//! );
//! let plan = PipelineBuilder::software().build(&[input], &request).unwrap();
//! assert_eq!(plan.video_filter.as_deref(), Some("scale=1280:720:flags=bicubic"));
//! ```

mod error;
mod filter;
pub mod graph;
mod pipeline;
pub mod reconcile;
mod request;
mod step;

pub use error::{PipelineError, Result};
pub use filter::{AudioFilter, FilterChain, VideoFilter};
pub use graph::{FilterGraph, FilterParam, ParsedChain, ParsedFilter};
pub use pipeline::{PipelineBuilder, StateTransition, TranscodePlan};
pub use reconcile::TargetState;
pub use request::{AudioOutputSpec, InputSettings, MediaInput, TranscodeRequest, VideoOutputSpec};
pub use step::{
    Contribution, EnvironmentVariable, GlobalOption, InputOption, OutputOption, PipelineStep,
    StepContext, StepKind,
};
