//! Frame state tracking.
//!
//! A [`FrameState`] records what a video frame looks like at one point of the
//! filter chain. States are never edited: each `with_*` call returns a new
//! value, and the pipeline keeps every intermediate state as its history.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::format::VideoCodec;
use crate::pixel::{HardwareSurface, PixelFormat, SoftwareFormat};
use crate::rational::Rational;
use crate::stream::{FrameSize, VideoStream};

/// Where frame data currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameDataLocation {
    /// System memory.
    #[default]
    Software,
    /// Device memory of the active backend.
    Hardware,
}

impl FrameDataLocation {
    pub fn is_hardware(&self) -> bool {
        matches!(self, Self::Hardware)
    }
}

/// Snapshot of a frame's properties between two pipeline steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameState {
    /// Picture size after scaling.
    pub scaled_size: FrameSize,
    /// Canvas size after padding; equals `scaled_size` until a pad runs.
    pub padded_size: FrameSize,
    /// `None` when the source layout is unknown.
    pub pixel_format: Option<PixelFormat>,
    pub location: FrameDataLocation,
    /// The source is interlaced.
    pub interlaced: bool,
    /// A deinterlacer has run.
    pub deinterlaced: bool,
    pub is_anamorphic: bool,
    /// Input is read at native frame rate.
    pub realtime: bool,
    pub video_format: VideoCodec,
    pub frame_rate: Option<Rational>,
}

impl FrameState {
    /// Initial state for frames decoded in software from `stream`.
    pub fn from_stream(stream: &VideoStream, realtime: bool) -> Self {
        Self {
            scaled_size: stream.frame_size,
            padded_size: stream.frame_size,
            pixel_format: stream.pixel_format.map(PixelFormat::software),
            location: FrameDataLocation::Software,
            interlaced: stream.scan_type.is_interlaced(),
            deinterlaced: false,
            is_anamorphic: stream.is_anamorphic,
            realtime,
            video_format: stream.codec.clone(),
            frame_rate: stream.frame_rate,
        }
    }

    /// The frame still carries interlaced fields.
    pub fn is_interlaced(&self) -> bool {
        self.interlaced && !self.deinterlaced
    }

    /// Memory layout of the frame, ignoring residency.
    pub fn software_format(&self) -> Option<SoftwareFormat> {
        self.pixel_format.map(|f| f.software_format())
    }

    pub fn surface(&self) -> Option<HardwareSurface> {
        self.pixel_format.and_then(|f| f.surface())
    }

    /// Scaled to `size`. Scaling produces square pixels and resets padding.
    pub fn with_scaled_size(&self, size: FrameSize) -> Self {
        Self {
            scaled_size: size,
            padded_size: size,
            is_anamorphic: false,
            ..self.clone()
        }
    }

    pub fn with_padded_size(&self, size: FrameSize) -> Self {
        Self {
            padded_size: size,
            ..self.clone()
        }
    }

    /// Converted to `format`, keeping the current residency.
    pub fn with_pixel_format(&self, format: SoftwareFormat) -> Self {
        let pixel_format = match self.surface() {
            Some(surface) => PixelFormat::hardware(surface, format),
            None => PixelFormat::software(format),
        };
        Self {
            pixel_format: Some(pixel_format),
            ..self.clone()
        }
    }

    /// Moved onto `surface` holding `layout`.
    pub fn with_hardware_frames(&self, surface: HardwareSurface, layout: SoftwareFormat) -> Self {
        Self {
            pixel_format: Some(PixelFormat::hardware(surface, layout)),
            location: FrameDataLocation::Hardware,
            ..self.clone()
        }
    }

    /// Moved into system memory as `layout`.
    pub fn with_software_frames(&self, layout: SoftwareFormat) -> Self {
        Self {
            pixel_format: Some(PixelFormat::software(layout)),
            location: FrameDataLocation::Software,
            ..self.clone()
        }
    }

    pub fn with_deinterlaced(&self) -> Self {
        Self {
            deinterlaced: true,
            ..self.clone()
        }
    }

    pub fn with_video_format(&self, codec: VideoCodec) -> Self {
        Self {
            video_format: codec,
            ..self.clone()
        }
    }

    /// Check the state's internal consistency.
    pub fn validate(&self) -> Result<()> {
        match (self.location, self.pixel_format) {
            (FrameDataLocation::Hardware, Some(format)) if !format.is_hardware() => {
                return Err(Error::InvalidFrameState(format!(
                    "hardware frames carry software format {}",
                    format
                )));
            }
            (FrameDataLocation::Software, Some(format)) if format.is_hardware() => {
                return Err(Error::InvalidFrameState(format!(
                    "software frames carry hardware format {}",
                    format
                )));
            }
            _ => {}
        }
        if self.scaled_size.width == 0 || self.scaled_size.height == 0 {
            return Err(Error::InvalidFrameState(format!(
                "empty picture {}",
                self.scaled_size
            )));
        }
        if self.padded_size.width < self.scaled_size.width
            || self.padded_size.height < self.scaled_size.height
        {
            return Err(Error::InvalidFrameState(format!(
                "canvas {} smaller than picture {}",
                self.padded_size, self.scaled_size
            )));
        }
        Ok(())
    }
}
