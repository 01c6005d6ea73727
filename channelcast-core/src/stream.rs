//! Stream descriptors.
//!
//! A descriptor is built once from probe output and never changes afterwards;
//! everything the pipeline learns about an input comes from these values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::format::{AudioCodec, VideoCodec};
use crate::pixel::SoftwareFormat;
use crate::rational::Rational;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    /// Create a new frame size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Largest even-dimensioned size inside `bounds` with the display aspect
    /// `aspect_num / aspect_den`.
    pub fn fit_within(bounds: FrameSize, aspect_num: u64, aspect_den: u64) -> FrameSize {
        if aspect_num == 0 || aspect_den == 0 {
            return bounds;
        }
        let bw = u64::from(bounds.width);
        let bh = u64::from(bounds.height);
        if aspect_num * bh > bw * aspect_den {
            // wider than the box: width-limited
            let height = round_even(bw * aspect_den, aspect_num).min(bounds.height);
            FrameSize::new(bounds.width, height)
        } else {
            let width = round_even(bh * aspect_num, aspect_den).min(bounds.width);
            FrameSize::new(width, bounds.height)
        }
    }

    /// Total pixel count.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// `n / d` rounded to the nearest even integer, at least 2.
fn round_even(n: u64, d: u64) -> u32 {
    let halves = (n + d) / (2 * d);
    (halves.max(1) * 2) as u32
}

/// Scan type, derived from ffprobe's `field_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Progressive,
    Interlaced,
    #[default]
    Unknown,
}

impl ScanType {
    /// Interpret an ffprobe `field_order` value.
    pub fn from_field_order(field_order: Option<&str>) -> Self {
        match field_order.map(str::trim) {
            Some("progressive") => Self::Progressive,
            Some("tt" | "bb" | "tb" | "bt") => Self::Interlaced,
            _ => Self::Unknown,
        }
    }

    pub fn is_interlaced(&self) -> bool {
        matches!(self, Self::Interlaced)
    }
}

/// Intrinsic properties of one input video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStream {
    /// Stream index within its input.
    pub index: usize,
    pub codec: VideoCodec,
    pub frame_size: FrameSize,
    /// `None` when the prober could not name the layout.
    pub pixel_format: Option<SoftwareFormat>,
    pub sample_aspect_ratio: Option<Rational>,
    pub display_aspect_ratio: Option<Rational>,
    pub color_transfer: Option<String>,
    pub scan_type: ScanType,
    pub frame_rate: Option<Rational>,
    pub profile: Option<String>,
    pub is_anamorphic: bool,
}

impl VideoStream {
    /// Create a progressive, square-pixel descriptor.
    pub fn new(index: usize, codec: VideoCodec, frame_size: FrameSize) -> Self {
        Self {
            index,
            codec,
            frame_size,
            pixel_format: None,
            sample_aspect_ratio: None,
            display_aspect_ratio: None,
            color_transfer: None,
            scan_type: ScanType::Progressive,
            frame_rate: None,
            profile: None,
            is_anamorphic: false,
        }
    }

    pub fn with_pixel_format(mut self, format: SoftwareFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }

    /// Set the sample aspect ratio; non-square samples mark the stream anamorphic.
    pub fn with_sample_aspect_ratio(mut self, sar: Rational) -> Self {
        self.is_anamorphic = !sar.is_zero() && !sar.is_one();
        self.sample_aspect_ratio = Some(sar);
        self
    }

    pub fn with_display_aspect_ratio(mut self, dar: Rational) -> Self {
        self.display_aspect_ratio = Some(dar);
        self
    }

    pub fn with_scan_type(mut self, scan_type: ScanType) -> Self {
        self.scan_type = scan_type;
        self
    }

    pub fn with_frame_rate(mut self, rate: Rational) -> Self {
        self.frame_rate = Some(rate);
        self
    }

    pub fn with_color_transfer(mut self, transfer: impl Into<String>) -> Self {
        self.color_transfer = Some(transfer.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Display aspect as an unreduced fraction, derived from the sample aspect
    /// ratio so anamorphic sources report their intended shape.
    pub fn display_aspect(&self) -> (u64, u64) {
        let sar = self
            .sample_aspect_ratio
            .filter(|r| !r.is_zero())
            .unwrap_or_else(Rational::one);
        (
            u64::from(self.frame_size.width) * u64::from(sar.num),
            u64::from(self.frame_size.height) * u64::from(sar.den),
        )
    }

    /// Square-pixel size the stream is meant to be shown at. Anamorphic
    /// sources are stretched horizontally; height is preserved.
    pub fn display_size(&self) -> FrameSize {
        let (num, den) = self.display_aspect();
        let height = u64::from(self.frame_size.height);
        FrameSize::new(round_even(height * num, den), self.frame_size.height)
    }

    /// Size the picture takes when fitted inside `bounds` without distortion.
    pub fn fitted_size(&self, bounds: FrameSize) -> FrameSize {
        let (num, den) = self.display_aspect();
        FrameSize::fit_within(bounds, num, den)
    }

    /// True for PQ and HLG transfer characteristics.
    pub fn is_hdr(&self) -> bool {
        matches!(
            self.color_transfer.as_deref(),
            Some("smpte2084" | "arib-std-b67")
        )
    }
}

/// Intrinsic properties of one input audio stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStream {
    /// Stream index within its input.
    pub index: usize,
    pub codec: AudioCodec,
    pub channels: u16,
    pub sample_rate: u32,
    /// Bits per second, when the container reports it.
    pub bitrate: Option<u64>,
    pub duration: Option<Duration>,
}

impl AudioStream {
    pub fn new(index: usize, codec: AudioCodec, channels: u16, sample_rate: u32) -> Self {
        Self {
            index,
            codec,
            channels,
            sample_rate,
            bitrate: None,
            duration: None,
        }
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}
