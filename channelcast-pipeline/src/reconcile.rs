//! Frame state reconciliation checks.
//!
//! Each check compares the running frame state against the state the encoder
//! must receive. The builder evaluates them in a fixed order: upload,
//! deinterlace, scale, pad, format conversion, download.

use channelcast_core::{FrameDataLocation, FrameSize, FrameState, PixelFormat, SoftwareFormat};
use channelcast_hwaccel::EncoderInput;
use serde::Serialize;

/// The frame state the encoder must receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetState {
    /// Picture size inside the canvas.
    pub scaled_size: FrameSize,
    /// Output canvas.
    pub padded_size: FrameSize,
    pub location: FrameDataLocation,
    pub pixel_format: PixelFormat,
    /// Interlaced output is forbidden.
    pub deinterlace: bool,
}

impl TargetState {
    pub fn new(scaled_size: FrameSize, padded_size: FrameSize, input: EncoderInput) -> Self {
        Self {
            scaled_size,
            padded_size,
            location: input.location,
            pixel_format: input.pixel_format,
            deinterlace: true,
        }
    }

    pub fn with_deinterlace(mut self, deinterlace: bool) -> Self {
        self.deinterlace = deinterlace;
        self
    }

    /// Memory layout the encoder wants, ignoring residency.
    pub fn layout(&self) -> SoftwareFormat {
        self.pixel_format.software_format()
    }
}

pub fn need_deinterlace(state: &FrameState, target: &TargetState) -> bool {
    target.deinterlace && state.is_interlaced()
}

pub fn need_scale(state: &FrameState, target: &TargetState) -> bool {
    state.scaled_size != target.scaled_size
}

pub fn need_pad(state: &FrameState, target: &TargetState) -> bool {
    state.padded_size != target.padded_size
}

/// Layouts differ, or the source layout is unknown.
pub fn need_format_conversion(state: &FrameState, target: &TargetState) -> bool {
    state.software_format() != Some(target.layout())
}

/// A step that runs at `required` cannot see frames in system memory.
pub fn need_hardware_upload(state: &FrameState, required: FrameDataLocation) -> bool {
    state.location == FrameDataLocation::Software && required == FrameDataLocation::Hardware
}

pub fn need_hardware_download(state: &FrameState, required: FrameDataLocation) -> bool {
    state.location == FrameDataLocation::Hardware && required == FrameDataLocation::Software
}

/// The state is exactly what the encoder accepts.
pub fn satisfies(state: &FrameState, target: &TargetState) -> bool {
    !need_deinterlace(state, target)
        && !need_scale(state, target)
        && !need_pad(state, target)
        && state.location == target.location
        && state.pixel_format == Some(target.pixel_format)
}

/// Short description of the first difference, for error messages.
pub fn mismatch(state: &FrameState, target: &TargetState) -> Option<String> {
    if need_deinterlace(state, target) {
        return Some("frames are still interlaced".to_string());
    }
    if need_scale(state, target) {
        return Some(format!(
            "picture is {}, encoder expects {}",
            state.scaled_size, target.scaled_size
        ));
    }
    if need_pad(state, target) {
        return Some(format!(
            "canvas is {}, encoder expects {}",
            state.padded_size, target.padded_size
        ));
    }
    if state.location != target.location || state.pixel_format != Some(target.pixel_format) {
        let current = state
            .pixel_format
            .map_or_else(|| "unknown".to_string(), |f| f.to_string());
        return Some(format!(
            "frames are {}, encoder expects {}",
            current, target.pixel_format
        ));
    }
    None
}
