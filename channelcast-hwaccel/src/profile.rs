//! Hardware capability profiles.
//!
//! A [`CapabilityProfile`] is the read-only description of one backend: which
//! codecs it decodes and encodes, which source layouts its decoders accept, and
//! the device it opens. Profiles are built once and shared behind an `Arc`.

use channelcast_core::{SoftwareFormat, VideoCodec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::detect::VaapiCapabilities;
use crate::types::{HardwareSettings, DEFAULT_RENDER_NODE};
use crate::HwAccelMode;

/// What one backend can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub mode: HwAccelMode,
    /// Codec to decoder name.
    pub decoders: BTreeMap<VideoCodec, String>,
    /// Codec to encoder name.
    pub encoders: BTreeMap<VideoCodec, String>,
    /// Source layouts the hardware decoders accept.
    pub pixel_formats: BTreeSet<SoftwareFormat>,
    pub device: Option<String>,
    /// VA-API driver name exported as `LIBVA_DRIVER_NAME`.
    pub driver: Option<String>,
}

const EIGHT_BIT: [SoftwareFormat; 2] = [SoftwareFormat::Yuv420p, SoftwareFormat::Nv12];
const TEN_BIT: [SoftwareFormat; 2] = [SoftwareFormat::Yuv420p10le, SoftwareFormat::P010le];

fn table(entries: &[(VideoCodec, &str)]) -> BTreeMap<VideoCodec, String> {
    entries
        .iter()
        .map(|(codec, name)| (codec.clone(), name.to_string()))
        .collect()
}

fn surface_formats(ten_bit: bool) -> BTreeSet<SoftwareFormat> {
    let mut formats: BTreeSet<_> = EIGHT_BIT.into_iter().collect();
    if ten_bit {
        formats.extend(TEN_BIT);
    }
    formats
}

impl CapabilityProfile {
    fn empty(mode: HwAccelMode) -> Self {
        Self {
            mode,
            decoders: BTreeMap::new(),
            encoders: BTreeMap::new(),
            pixel_formats: BTreeSet::new(),
            device: None,
            driver: None,
        }
    }

    /// The no-hardware profile. Always valid.
    pub fn software() -> Self {
        Self {
            encoders: table(&[
                (VideoCodec::H264, "libx264"),
                (VideoCodec::Hevc, "libx265"),
                (VideoCodec::Mpeg2, "mpeg2video"),
                (VideoCodec::Mpeg4, "mpeg4"),
                (VideoCodec::Vp9, "libvpx-vp9"),
                (VideoCodec::Av1, "libsvtav1"),
            ]),
            pixel_formats: SoftwareFormat::ALL.into_iter().collect(),
            ..Self::empty(HwAccelMode::None)
        }
    }

    /// Full VA-API table for a modern Intel/AMD driver.
    pub fn vaapi(device: impl Into<String>, driver: Option<String>) -> Self {
        Self::vaapi_from(&VaapiCapabilities::full(), device, driver)
    }

    /// VA-API profile restricted to what `vainfo` reported.
    pub fn vaapi_from(
        caps: &VaapiCapabilities,
        device: impl Into<String>,
        driver: Option<String>,
    ) -> Self {
        let decoders = caps
            .decode
            .iter()
            .map(|codec| (codec.clone(), codec.ffmpeg_name().to_string()))
            .collect();
        let encoders = caps
            .encode
            .iter()
            .filter_map(|codec| {
                let name = match codec {
                    VideoCodec::H264 => "h264_vaapi",
                    VideoCodec::Hevc => "hevc_vaapi",
                    VideoCodec::Mpeg2 => "mpeg2_vaapi",
                    VideoCodec::Vp9 => "vp9_vaapi",
                    VideoCodec::Av1 => "av1_vaapi",
                    _ => return None,
                };
                Some((codec.clone(), name.to_string()))
            })
            .collect();
        Self {
            mode: HwAccelMode::Vaapi,
            decoders,
            encoders,
            pixel_formats: surface_formats(caps.ten_bit),
            device: Some(device.into()),
            driver,
        }
    }

    /// Full Quick Sync table.
    pub fn qsv(device: impl Into<String>, driver: Option<String>) -> Self {
        Self::qsv_from(&VaapiCapabilities::full(), device, driver)
    }

    /// Quick Sync profile restricted to what the underlying VA driver reported.
    pub fn qsv_from(
        caps: &VaapiCapabilities,
        device: impl Into<String>,
        driver: Option<String>,
    ) -> Self {
        let qsv_name = |codec: &VideoCodec| -> Option<&'static str> {
            Some(match codec {
                VideoCodec::H264 => "h264_qsv",
                VideoCodec::Hevc => "hevc_qsv",
                VideoCodec::Mpeg2 => "mpeg2_qsv",
                VideoCodec::Vc1 => "vc1_qsv",
                VideoCodec::Vp9 => "vp9_qsv",
                VideoCodec::Av1 => "av1_qsv",
                _ => return None,
            })
        };
        let pick = |codecs: &BTreeSet<VideoCodec>| {
            codecs
                .iter()
                .filter_map(|c| qsv_name(c).map(|n| (c.clone(), n.to_string())))
                .collect::<BTreeMap<_, _>>()
        };
        let mut encoders = pick(&caps.encode);
        // no QSV encoder for VC-1
        encoders.remove(&VideoCodec::Vc1);
        Self {
            mode: HwAccelMode::Qsv,
            decoders: pick(&caps.decode),
            encoders,
            pixel_formats: surface_formats(caps.ten_bit),
            device: Some(device.into()),
            driver,
        }
    }

    /// CUDA table for a current (Ada or newer) GPU.
    pub fn cuda(device_index: u32) -> Self {
        Self::cuda_for_compute(device_index, 8, 9)
    }

    /// CUDA table gated by the GPU's compute capability.
    pub fn cuda_for_compute(device_index: u32, major: u32, minor: u32) -> Self {
        let cc = (major, minor);
        let mut decoders = table(&[
            (VideoCodec::H264, "h264"),
            (VideoCodec::Mpeg2, "mpeg2video"),
            (VideoCodec::Vc1, "vc1"),
        ]);
        let mut encoders = table(&[(VideoCodec::H264, "h264_nvenc")]);
        if cc >= (6, 0) {
            decoders.insert(VideoCodec::Hevc, "hevc".into());
            decoders.insert(VideoCodec::Vp9, "vp9".into());
            encoders.insert(VideoCodec::Hevc, "hevc_nvenc".into());
        }
        if cc >= (8, 6) {
            decoders.insert(VideoCodec::Av1, "av1".into());
        }
        if cc >= (8, 9) {
            encoders.insert(VideoCodec::Av1, "av1_nvenc".into());
        }
        Self {
            mode: HwAccelMode::Cuda,
            decoders,
            encoders,
            pixel_formats: surface_formats(cc >= (6, 0)),
            device: Some(device_index.to_string()),
            driver: None,
        }
    }

    /// VideoToolbox table.
    pub fn videotoolbox() -> Self {
        Self {
            decoders: table(&[
                (VideoCodec::H264, "h264"),
                (VideoCodec::Hevc, "hevc"),
                (VideoCodec::Mpeg2, "mpeg2video"),
            ]),
            encoders: table(&[
                (VideoCodec::H264, "h264_videotoolbox"),
                (VideoCodec::Hevc, "hevc_videotoolbox"),
            ]),
            pixel_formats: surface_formats(true),
            ..Self::empty(HwAccelMode::VideoToolbox)
        }
    }

    /// Built-in table for `mode` without probing the machine.
    pub fn builtin(mode: HwAccelMode, settings: &HardwareSettings) -> Self {
        let profile = match mode {
            HwAccelMode::None => return Self::software(),
            HwAccelMode::Vaapi => {
                Self::vaapi(settings.vaapi_device.clone(), settings.vaapi_driver.clone())
            }
            HwAccelMode::Qsv => {
                Self::qsv(settings.qsv_device(), settings.vaapi_driver.clone())
            }
            HwAccelMode::Cuda => Self::cuda(settings.cuda_device),
            HwAccelMode::VideoToolbox => Self::videotoolbox(),
        };
        profile.restricted(settings)
    }

    /// Drop the decoders and encoders the settings disable.
    pub fn restricted(mut self, settings: &HardwareSettings) -> Self {
        if self.mode.is_hardware() {
            self.decoders
                .retain(|codec, _| !settings.disabled_decoders.contains(codec));
            self.encoders
                .retain(|codec, _| !settings.disabled_encoders.contains(codec));
        }
        self
    }

    pub fn has_decoder(&self, codec: &VideoCodec) -> bool {
        self.decoders.contains_key(codec)
    }

    pub fn decoder_for(&self, codec: &VideoCodec) -> Option<&str> {
        self.decoders.get(codec).map(String::as_str)
    }

    pub fn has_encoder(&self, codec: &VideoCodec) -> bool {
        self.encoders.contains_key(codec)
    }

    pub fn encoder_for(&self, codec: &VideoCodec) -> Option<&str> {
        self.encoders.get(codec).map(String::as_str)
    }

    pub fn supports_format(&self, format: SoftwareFormat) -> bool {
        self.pixel_formats.contains(&format)
    }

    /// Global options that open the backend's device.
    pub fn device_init_args(&self) -> Vec<String> {
        let device = self.device.as_deref().unwrap_or(DEFAULT_RENDER_NODE);
        match self.mode {
            HwAccelMode::Vaapi => vec![
                "-init_hw_device".into(),
                format!("vaapi=va:{}", device),
                "-filter_hw_device".into(),
                "va".into(),
            ],
            HwAccelMode::Qsv => vec![
                "-init_hw_device".into(),
                format!("vaapi=va:{}", device),
                "-init_hw_device".into(),
                "qsv=qs@va".into(),
                "-filter_hw_device".into(),
                "qs".into(),
            ],
            HwAccelMode::Cuda => vec![
                "-init_hw_device".into(),
                format!("cuda=cu:{}", self.device.as_deref().unwrap_or("0")),
                "-filter_hw_device".into(),
                "cu".into(),
            ],
            HwAccelMode::None | HwAccelMode::VideoToolbox => Vec::new(),
        }
    }

    /// Environment the transcoder process needs.
    pub fn environment(&self) -> Vec<(String, String)> {
        match (self.mode, &self.driver) {
            (HwAccelMode::Vaapi | HwAccelMode::Qsv, Some(driver)) => {
                vec![("LIBVA_DRIVER_NAME".to_string(), driver.clone())]
            }
            _ => Vec::new(),
        }
    }
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self::software()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_profile() {
        let profile = CapabilityProfile::software();
        assert_eq!(profile.mode, HwAccelMode::None);
        assert!(profile.decoders.is_empty());
        assert_eq!(profile.encoder_for(&VideoCodec::H264), Some("libx264"));
        assert!(profile.supports_format(SoftwareFormat::Yuv444p));
        assert!(profile.device_init_args().is_empty());
    }

    #[test]
    fn test_vaapi_device_and_driver() {
        let profile = CapabilityProfile::vaapi("/dev/dri/renderD129", Some("iHD".into()));
        assert_eq!(
            profile.device_init_args(),
            vec!["-init_hw_device", "vaapi=va:/dev/dri/renderD129", "-filter_hw_device", "va"]
        );
        assert_eq!(
            profile.environment(),
            vec![("LIBVA_DRIVER_NAME".to_string(), "iHD".to_string())]
        );
        assert_eq!(profile.encoder_for(&VideoCodec::Hevc), Some("hevc_vaapi"));
        assert!(!profile.supports_format(SoftwareFormat::Yuv422p));
    }

    #[test]
    fn test_cuda_compute_gates() {
        let maxwell = CapabilityProfile::cuda_for_compute(0, 5, 2);
        assert!(!maxwell.has_encoder(&VideoCodec::Hevc));
        assert!(!maxwell.supports_format(SoftwareFormat::P010le));

        let ampere = CapabilityProfile::cuda_for_compute(0, 8, 6);
        assert!(ampere.has_decoder(&VideoCodec::Av1));
        assert!(!ampere.has_encoder(&VideoCodec::Av1));

        let ada = CapabilityProfile::cuda(1);
        assert_eq!(ada.encoder_for(&VideoCodec::Av1), Some("av1_nvenc"));
        assert_eq!(ada.device_init_args()[1], "cuda=cu:1");
    }

    #[test]
    fn test_qsv_names() {
        let profile = CapabilityProfile::qsv("/dev/dri/renderD128", None);
        assert_eq!(profile.decoder_for(&VideoCodec::Mpeg2), Some("mpeg2_qsv"));
        assert!(!profile.has_encoder(&VideoCodec::Vc1));
        assert_eq!(profile.device_init_args().len(), 6);
    }

    #[test]
    fn test_disabled_codecs() {
        let mut settings = HardwareSettings::new(HwAccelMode::Vaapi);
        settings.disabled_decoders.insert(VideoCodec::Hevc);
        settings.disabled_encoders.insert(VideoCodec::H264);
        let profile = CapabilityProfile::builtin(HwAccelMode::Vaapi, &settings);
        assert!(!profile.has_decoder(&VideoCodec::Hevc));
        assert!(profile.has_decoder(&VideoCodec::H264));
        assert!(!profile.has_encoder(&VideoCodec::H264));
    }

    #[test]
    fn test_profile_serializes_with_codec_keys() {
        let json = serde_json::to_value(CapabilityProfile::videotoolbox()).unwrap();
        assert_eq!(json["encoders"]["h264"], "h264_videotoolbox");
        assert_eq!(json["mode"], "videotoolbox");
    }
}
