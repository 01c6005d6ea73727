//! Decoder selection.

use channelcast_core::{FrameState, VideoCodec, VideoStream};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HwAccelError, Result};
use crate::profile::CapabilityProfile;
use crate::HwAccelMode;

/// How an input video stream is decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Decoder {
    /// Packets are passed through untouched.
    Copy,
    /// ffmpeg's native software decoder.
    Software,
    /// Hardware decoding on `mode` with decoder `name`.
    Hardware { mode: HwAccelMode, name: String },
}

impl Decoder {
    /// Pick the decoder for `stream`.
    ///
    /// Hardware decoding needs a profile entry for the codec and a source
    /// layout the backend accepts; anything else decodes in software, which
    /// still lets the encode side run in hardware.
    pub fn select(stream: &VideoStream, profile: &CapabilityProfile) -> Self {
        if !profile.mode.is_hardware() {
            return Decoder::Software;
        }
        let Some(name) = profile.decoder_for(&stream.codec) else {
            debug!(
                backend = %profile.mode,
                codec = %stream.codec,
                "No hardware decoder, decoding in software"
            );
            return Decoder::Software;
        };
        match stream.pixel_format {
            Some(format) if profile.supports_format(format) => Decoder::Hardware {
                mode: profile.mode,
                name: name.to_string(),
            },
            other => {
                debug!(
                    backend = %profile.mode,
                    pixel_format = ?other,
                    "Source layout not decodable in hardware, decoding in software"
                );
                Decoder::Software
            }
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self, Decoder::Hardware { .. })
    }

    /// Decoder name for display.
    pub fn name(&self, codec: &VideoCodec) -> String {
        match self {
            Decoder::Copy => "copy".to_string(),
            Decoder::Software => codec.ffmpeg_name().to_string(),
            Decoder::Hardware { name, .. } => name.clone(),
        }
    }

    /// Options placed before the `-i` of the input.
    pub fn input_args(&self, codec: &VideoCodec) -> Vec<String> {
        let Decoder::Hardware { mode, name } = self else {
            return Vec::new();
        };
        let mut args = Vec::new();
        if let Some(hwaccel) = mode.hwaccel_name() {
            args.push("-hwaccel".to_string());
            args.push(hwaccel.to_string());
        }
        if let Some(label) = mode.device_label() {
            args.push("-hwaccel_device".to_string());
            args.push(label.to_string());
        }
        if let (true, Some(surface)) = (mode.filters_on_device(), mode.surface()) {
            args.push("-hwaccel_output_format".to_string());
            args.push(surface.name().to_string());
        }
        if name != codec.ffmpeg_name() {
            args.push("-c:v".to_string());
            args.push(name.clone());
        }
        args
    }

    /// Frame state right after decoding.
    pub fn output_state(&self, state: &FrameState) -> Result<FrameState> {
        let Decoder::Hardware { mode, .. } = self else {
            return Ok(state.clone());
        };
        let layout = state.software_format().ok_or_else(|| {
            HwAccelError::Config("hardware decode of a stream with unknown pixel format".into())
        })?;
        let native = layout.hardware_native();
        match mode.surface() {
            Some(surface) if mode.filters_on_device() => {
                Ok(state.with_hardware_frames(surface, native))
            }
            _ => Ok(state.with_software_frames(native)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channelcast_core::{
        FrameDataLocation, FrameSize, HardwareSurface, PixelFormat, SoftwareFormat,
    };

    fn h264(format: SoftwareFormat) -> VideoStream {
        VideoStream::new(0, VideoCodec::H264, FrameSize::new(1920, 1080)).with_pixel_format(format)
    }

    #[test]
    fn test_software_profile_decodes_in_software() {
        let decoder = Decoder::select(&h264(SoftwareFormat::Yuv420p), &CapabilityProfile::software());
        assert_eq!(decoder, Decoder::Software);
        assert!(decoder.input_args(&VideoCodec::H264).is_empty());
    }

    #[test]
    fn test_cuda_decode_args_and_state() {
        let stream = h264(SoftwareFormat::Yuv420p);
        let decoder = Decoder::select(&stream, &CapabilityProfile::cuda(0));
        assert!(decoder.is_hardware());
        assert_eq!(
            decoder.input_args(&stream.codec),
            vec!["-hwaccel", "cuda", "-hwaccel_device", "cu", "-hwaccel_output_format", "cuda"]
        );

        let state = decoder.output_state(&FrameState::from_stream(&stream, false)).unwrap();
        assert_eq!(state.location, FrameDataLocation::Hardware);
        assert_eq!(
            state.pixel_format,
            Some(PixelFormat::hardware(HardwareSurface::Cuda, SoftwareFormat::Nv12))
        );
    }

    #[test]
    fn test_qsv_names_decoder() {
        let stream = h264(SoftwareFormat::Yuv420p);
        let decoder = Decoder::select(&stream, &CapabilityProfile::qsv("/dev/dri/renderD128", None));
        let args = decoder.input_args(&stream.codec);
        assert_eq!(&args[args.len() - 2..], ["-c:v", "h264_qsv"]);
    }

    #[test]
    fn test_videotoolbox_decodes_to_system_memory() {
        let stream = h264(SoftwareFormat::Yuv420p10le);
        let decoder = Decoder::select(&stream, &CapabilityProfile::videotoolbox());
        assert_eq!(decoder.input_args(&stream.codec), vec!["-hwaccel", "videotoolbox"]);
        let state = decoder.output_state(&FrameState::from_stream(&stream, false)).unwrap();
        assert_eq!(state.location, FrameDataLocation::Software);
        assert_eq!(state.pixel_format, Some(PixelFormat::software(SoftwareFormat::P010le)));
    }

    #[test]
    fn test_unsupported_layout_falls_back() {
        let stream = h264(SoftwareFormat::Yuv422p);
        let decoder = Decoder::select(&stream, &CapabilityProfile::vaapi("/dev/dri/renderD128", None));
        assert_eq!(decoder, Decoder::Software);

        let unknown = VideoStream::new(0, VideoCodec::H264, FrameSize::new(640, 480));
        assert_eq!(
            Decoder::select(&unknown, &CapabilityProfile::cuda(0)),
            Decoder::Software
        );
    }

    #[test]
    fn test_unknown_codec_decodes_in_software() {
        let stream = VideoStream::new(0, VideoCodec::Other("prores".into()), FrameSize::new(1920, 1080))
            .with_pixel_format(SoftwareFormat::Yuv422p);
        assert_eq!(
            Decoder::select(&stream, &CapabilityProfile::cuda(0)),
            Decoder::Software
        );
    }
}
