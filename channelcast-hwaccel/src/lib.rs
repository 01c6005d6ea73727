//! Hardware acceleration layer for channelcast.
//!
//! This crate describes what each transcoding backend can do and picks the
//! decoder and encoder a pipeline should use:
//!
//! - **VAAPI** (Video Acceleration API) - Linux/Intel/AMD
//! - **QSV** (Quick Sync Video) - Intel
//! - **CUDA/NVENC** - NVIDIA GPUs
//! - **VideoToolbox** - macOS
//!
//! # Example
//!
//! ```no_run
//! use channelcast_hwaccel::{CapabilityCache, HardwareSettings, HwAccelMode, SystemProber};
//!
//! let settings = HardwareSettings::new(HwAccelMode::Cuda);
//! let cache = CapabilityCache::new(SystemProber, settings);
//! let snapshot = cache.requested();
//! println!("effective backend: {}", snapshot.effective_mode());
//! ```

pub mod decoder;
pub mod detect;
pub mod encoder;
pub mod error;
pub mod fallback;
pub mod profile;
pub mod types;

pub use decoder::Decoder;
pub use detect::{
    parse_nvidia_smi, parse_vainfo, CapabilityCache, CapabilityProber, CapabilitySnapshot,
    GpuInfo, SystemProber, VaapiCapabilities,
};
pub use encoder::{Encoder, EncoderInput};
pub use error::{HwAccelError, Result};
pub use fallback::{resolve_encoder_backend, BackendResolution, FallbackReason};
pub use profile::CapabilityProfile;
pub use types::{EncoderSettings, HardwareSettings};

use channelcast_core::HardwareSurface;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hardware acceleration mode.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HwAccelMode {
    /// Software decode, filter and encode.
    #[default]
    #[serde(alias = "software")]
    None,
    /// VA-API (Linux).
    Vaapi,
    /// Intel Quick Sync Video.
    Qsv,
    /// NVIDIA CUDA/NVDEC/NVENC.
    #[serde(alias = "nvenc")]
    Cuda,
    /// VideoToolbox (macOS).
    VideoToolbox,
}

impl HwAccelMode {
    /// Every mode, software first.
    pub const ALL: [HwAccelMode; 5] = [
        Self::None,
        Self::Vaapi,
        Self::Qsv,
        Self::Cuda,
        Self::VideoToolbox,
    ];

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            HwAccelMode::None => "Software",
            HwAccelMode::Vaapi => "VA-API",
            HwAccelMode::Qsv => "Quick Sync",
            HwAccelMode::Cuda => "CUDA/NVENC",
            HwAccelMode::VideoToolbox => "VideoToolbox",
        }
    }

    /// The value passed to ffmpeg's `-hwaccel`.
    pub fn hwaccel_name(&self) -> Option<&'static str> {
        match self {
            HwAccelMode::None => None,
            HwAccelMode::Vaapi => Some("vaapi"),
            HwAccelMode::Qsv => Some("qsv"),
            HwAccelMode::Cuda => Some("cuda"),
            HwAccelMode::VideoToolbox => Some("videotoolbox"),
        }
    }

    /// Surface frames live on while this backend owns them.
    pub fn surface(&self) -> Option<HardwareSurface> {
        match self {
            HwAccelMode::None => None,
            HwAccelMode::Vaapi => Some(HardwareSurface::Vaapi),
            HwAccelMode::Qsv => Some(HardwareSurface::Qsv),
            HwAccelMode::Cuda => Some(HardwareSurface::Cuda),
            HwAccelMode::VideoToolbox => Some(HardwareSurface::VideoToolbox),
        }
    }

    /// Label of the named device created with `-init_hw_device`.
    pub fn device_label(&self) -> Option<&'static str> {
        match self {
            HwAccelMode::Vaapi => Some("va"),
            HwAccelMode::Qsv => Some("qs"),
            HwAccelMode::Cuda => Some("cu"),
            HwAccelMode::None | HwAccelMode::VideoToolbox => None,
        }
    }

    /// Filters run on device surfaces for this backend.
    ///
    /// VideoToolbox decodes and encodes in hardware but filters in system memory.
    pub fn filters_on_device(&self) -> bool {
        matches!(self, HwAccelMode::Vaapi | HwAccelMode::Qsv | HwAccelMode::Cuda)
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, HwAccelMode::None)
    }
}

impl fmt::Display for HwAccelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hwaccel_name().unwrap_or("none"))
    }
}

impl FromStr for HwAccelMode {
    type Err = HwAccelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "software" | "sw" | "cpu" => Ok(HwAccelMode::None),
            "vaapi" => Ok(HwAccelMode::Vaapi),
            "qsv" | "intel" | "quicksync" => Ok(HwAccelMode::Qsv),
            "cuda" | "nvenc" | "nvidia" => Ok(HwAccelMode::Cuda),
            "videotoolbox" | "vt" | "apple" => Ok(HwAccelMode::VideoToolbox),
            other => Err(HwAccelError::NotSupported(other.to_string())),
        }
    }
}
