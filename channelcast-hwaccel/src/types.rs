//! Configuration types for hardware acceleration.

use channelcast_core::VideoCodec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::HwAccelMode;

/// Default DRM render node.
pub const DEFAULT_RENDER_NODE: &str = "/dev/dri/renderD128";

/// Hardware settings as stored by the admin layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareSettings {
    /// Requested acceleration mode.
    pub mode: HwAccelMode,
    /// DRM render node used by VA-API.
    pub vaapi_device: String,
    /// Value for `LIBVA_DRIVER_NAME` (e.g. `iHD`, `radeonsi`).
    pub vaapi_driver: Option<String>,
    /// Render node for Quick Sync; defaults to the VA-API node.
    pub qsv_device: Option<String>,
    /// CUDA device index.
    pub cuda_device: u32,
    /// Codecs never decoded in hardware.
    pub disabled_decoders: BTreeSet<VideoCodec>,
    /// Codecs never encoded in hardware.
    pub disabled_encoders: BTreeSet<VideoCodec>,
}

impl Default for HardwareSettings {
    fn default() -> Self {
        Self {
            mode: HwAccelMode::None,
            vaapi_device: DEFAULT_RENDER_NODE.to_string(),
            vaapi_driver: None,
            qsv_device: None,
            cuda_device: 0,
            disabled_decoders: BTreeSet::new(),
            disabled_encoders: BTreeSet::new(),
        }
    }
}

impl HardwareSettings {
    /// Default settings requesting `mode`.
    pub fn new(mode: HwAccelMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Set the VA-API render node.
    pub fn with_vaapi_device(mut self, device: impl Into<String>) -> Self {
        self.vaapi_device = device.into();
        self
    }

    /// Set the VA-API driver name.
    pub fn with_vaapi_driver(mut self, driver: impl Into<String>) -> Self {
        self.vaapi_driver = Some(driver.into());
        self
    }

    /// Render node Quick Sync opens.
    pub fn qsv_device(&self) -> &str {
        self.qsv_device.as_deref().unwrap_or(&self.vaapi_device)
    }

    /// Device path for `mode`, if it uses one.
    pub fn device_for(&self, mode: HwAccelMode) -> Option<String> {
        match mode {
            HwAccelMode::Vaapi => Some(self.vaapi_device.clone()),
            HwAccelMode::Qsv => Some(self.qsv_device().to_string()),
            HwAccelMode::Cuda => Some(self.cuda_device.to_string()),
            HwAccelMode::None | HwAccelMode::VideoToolbox => None,
        }
    }
}

/// Output-side encoder parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Target bitrate in kbit/s; `None` selects constant quality.
    pub bitrate_kbps: Option<u32>,
    /// Rate-control buffer in kbit; defaults to twice the bitrate.
    pub buffer_size_kbps: Option<u32>,
    /// Keyframe interval in frames.
    pub gop_size: Option<u32>,
}

impl EncoderSettings {
    /// Constant-bitrate style settings.
    pub fn bitrate(kbps: u32) -> Self {
        Self {
            bitrate_kbps: Some(kbps),
            ..Default::default()
        }
    }

    /// Set buffer size.
    pub fn with_buffer_size(mut self, kbps: u32) -> Self {
        self.buffer_size_kbps = Some(kbps);
        self
    }

    /// Set GOP size.
    pub fn with_gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = Some(gop_size);
        self
    }

    /// Effective buffer size, if a bitrate is set.
    pub fn buffer_size(&self) -> Option<u32> {
        self.bitrate_kbps
            .map(|b| self.buffer_size_kbps.unwrap_or(b.saturating_mul(2)))
    }
}
