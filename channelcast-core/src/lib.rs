//! # Channelcast Core
//!
//! Data model shared by the channelcast pipeline compiler.
//!
//! This crate provides:
//! - Stream descriptors built from ffprobe output
//! - The pixel format registry (software layouts and hardware surfaces)
//! - Codec and container registries
//! - [`FrameState`], the immutable record threaded through a filter chain

pub mod error;
pub mod format;
pub mod frame_state;
pub mod pixel;
pub mod probe;
pub mod rational;
pub mod stream;

pub use error::{Error, Result};
pub use format::{AudioCodec, ContainerFormat, VideoCodec};
pub use frame_state::{FrameDataLocation, FrameState};
pub use pixel::{ChromaLayout, HardwareSurface, PixelFormat, SoftwareFormat};
pub use probe::{ProbeDocument, ProbedFormat, ProbedStream};
pub use rational::Rational;
pub use stream::{AudioStream, FrameSize, ScanType, VideoStream};
