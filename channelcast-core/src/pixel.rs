//! Pixel format registry.
//!
//! Software formats describe a memory layout; hardware formats box a software
//! layout on a device surface. Two formats are equal only when the name, bit
//! depth and wrapped layout all agree.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chroma subsampling layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChromaLayout {
    /// 4:2:0 subsampling.
    Yuv420,
    /// 4:2:2 subsampling.
    Yuv422,
    /// No subsampling.
    Yuv444,
    /// Packed RGB(A).
    Rgb,
}

/// Concrete software pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoftwareFormat {
    /// Planar YUV 4:2:0, 8-bit.
    Yuv420p,
    /// Planar YUV 4:2:0, 10-bit little endian.
    Yuv420p10le,
    /// Semi-planar YUV 4:2:0, 8-bit.
    Nv12,
    /// Semi-planar YUV 4:2:0, 10-bit.
    P010le,
    /// Planar YUV 4:2:2, 8-bit.
    Yuv422p,
    /// Planar YUV 4:4:4, 8-bit.
    Yuv444p,
    /// Planar YUV 4:4:4, 10-bit little endian.
    Yuv444p10le,
    /// Packed RGBA, 8-bit per channel.
    Rgba,
    /// Packed BGRA, 8-bit per channel.
    Bgra,
}

impl SoftwareFormat {
    /// All registered software formats.
    pub const ALL: [SoftwareFormat; 9] = [
        Self::Yuv420p,
        Self::Yuv420p10le,
        Self::Nv12,
        Self::P010le,
        Self::Yuv422p,
        Self::Yuv444p,
        Self::Yuv444p10le,
        Self::Rgba,
        Self::Bgra,
    ];

    /// The ffmpeg `pix_fmt` name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Yuv420p10le => "yuv420p10le",
            Self::Nv12 => "nv12",
            Self::P010le => "p010le",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Yuv444p10le => "yuv444p10le",
            Self::Rgba => "rgba",
            Self::Bgra => "bgra",
        }
    }

    /// Look up a format by its ffmpeg name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        // yuvj420p is full-range yuv420p; the layout is identical
        let name = match name.as_str() {
            "yuvj420p" => "yuv420p",
            "yuvj422p" => "yuv422p",
            "yuvj444p" => "yuv444p",
            "p010" => "p010le",
            other => other,
        };
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Bits per component.
    pub fn bit_depth(&self) -> u8 {
        match self {
            Self::Yuv420p10le | Self::P010le | Self::Yuv444p10le => 10,
            _ => 8,
        }
    }

    /// Chroma layout.
    pub fn chroma(&self) -> ChromaLayout {
        match self {
            Self::Yuv420p | Self::Yuv420p10le | Self::Nv12 | Self::P010le => ChromaLayout::Yuv420,
            Self::Yuv422p => ChromaLayout::Yuv422,
            Self::Yuv444p | Self::Yuv444p10le => ChromaLayout::Yuv444,
            Self::Rgba | Self::Bgra => ChromaLayout::Rgb,
        }
    }

    /// The semi-planar layout hardware surfaces use for this depth.
    pub fn hardware_native(&self) -> Self {
        if self.bit_depth() > 8 {
            Self::P010le
        } else {
            Self::Nv12
        }
    }

    /// The planar layout software encoders use for this depth.
    pub fn software_native(&self) -> Self {
        if self.bit_depth() > 8 {
            Self::Yuv420p10le
        } else {
            Self::Yuv420p
        }
    }
}

impl fmt::Display for SoftwareFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device surface a hardware frame lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareSurface {
    /// VA-API surface.
    Vaapi,
    /// CUDA device memory.
    Cuda,
    /// Intel Quick Sync surface.
    Qsv,
    /// CoreVideo pixel buffer.
    VideoToolbox,
}

impl HardwareSurface {
    /// The ffmpeg hardware pixel format name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vaapi => "vaapi",
            Self::Cuda => "cuda",
            Self::Qsv => "qsv",
            Self::VideoToolbox => "videotoolbox_vld",
        }
    }
}

/// A pixel format, either in system memory or boxed on a hardware surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "location", rename_all = "lowercase")]
pub enum PixelFormat {
    /// Frame data in system memory.
    Software { format: SoftwareFormat },
    /// Frame data on a device surface holding `wraps`.
    Hardware {
        surface: HardwareSurface,
        wraps: SoftwareFormat,
    },
}

impl PixelFormat {
    /// Software pixel format.
    pub fn software(format: SoftwareFormat) -> Self {
        Self::Software { format }
    }

    /// Hardware pixel format boxing `wraps`.
    pub fn hardware(surface: HardwareSurface, wraps: SoftwareFormat) -> Self {
        Self::Hardware { surface, wraps }
    }

    /// The name ffmpeg knows this format by.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Software { format } => format.name(),
            Self::Hardware { surface, .. } => surface.name(),
        }
    }

    /// The underlying memory layout.
    pub fn software_format(&self) -> SoftwareFormat {
        match self {
            Self::Software { format } => *format,
            Self::Hardware { wraps, .. } => *wraps,
        }
    }

    /// Surface the format lives on, if any.
    pub fn surface(&self) -> Option<HardwareSurface> {
        match self {
            Self::Software { .. } => None,
            Self::Hardware { surface, .. } => Some(*surface),
        }
    }

    /// Check if this is a hardware-wrapped format.
    pub fn is_hardware(&self) -> bool {
        matches!(self, Self::Hardware { .. })
    }

    /// Bits per component of the underlying layout.
    pub fn bit_depth(&self) -> u8 {
        self.software_format().bit_depth()
    }

    /// Box this format's layout on `surface`.
    pub fn wrap(&self, surface: HardwareSurface) -> Self {
        Self::hardware(surface, self.software_format())
    }

    /// Drop the surface and keep the layout.
    pub fn unwrap_software(&self) -> Self {
        Self::software(self.software_format())
    }

    /// Same memory layout, regardless of where the frame lives.
    pub fn is_compatible(&self, other: &PixelFormat) -> bool {
        self.software_format() == other.software_format()
    }
}

impl From<SoftwareFormat> for PixelFormat {
    fn from(format: SoftwareFormat) -> Self {
        Self::software(format)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Software { format } => write!(f, "{}", format),
            Self::Hardware { surface, wraps } => write!(f, "{}({})", surface.name(), wraps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        assert_eq!(SoftwareFormat::from_name("yuv420p"), Some(SoftwareFormat::Yuv420p));
        assert_eq!(SoftwareFormat::from_name("yuvj420p"), Some(SoftwareFormat::Yuv420p));
        assert_eq!(SoftwareFormat::from_name("p010"), Some(SoftwareFormat::P010le));
        assert_eq!(SoftwareFormat::from_name("gbrp"), None);
    }

    #[test]
    fn test_bit_depth_and_chroma() {
        assert_eq!(SoftwareFormat::Yuv420p10le.bit_depth(), 10);
        assert_eq!(SoftwareFormat::Nv12.chroma(), ChromaLayout::Yuv420);
        assert_eq!(SoftwareFormat::Bgra.chroma(), ChromaLayout::Rgb);
    }

    #[test]
    fn test_native_layouts() {
        assert_eq!(SoftwareFormat::Yuv420p.hardware_native(), SoftwareFormat::Nv12);
        assert_eq!(SoftwareFormat::Yuv420p10le.hardware_native(), SoftwareFormat::P010le);
        assert_eq!(SoftwareFormat::P010le.software_native(), SoftwareFormat::Yuv420p10le);
    }

    #[test]
    fn test_hardware_equality_needs_same_wrap() {
        let a = PixelFormat::hardware(HardwareSurface::Vaapi, SoftwareFormat::Nv12);
        let b = PixelFormat::hardware(HardwareSurface::Vaapi, SoftwareFormat::P010le);
        let c = PixelFormat::hardware(HardwareSurface::Cuda, SoftwareFormat::Nv12);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, PixelFormat::software(SoftwareFormat::Nv12).wrap(HardwareSurface::Vaapi));
    }

    #[test]
    fn test_compatibility_ignores_residency() {
        let hw = PixelFormat::hardware(HardwareSurface::Cuda, SoftwareFormat::Nv12);
        let sw = PixelFormat::software(SoftwareFormat::Nv12);
        assert_ne!(hw, sw);
        assert!(hw.is_compatible(&sw));
        assert_eq!(hw.unwrap_software(), sw);
        assert_eq!(hw.name(), "cuda");
        assert_eq!(hw.to_string(), "cuda(nv12)");
    }
}
