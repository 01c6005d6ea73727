//! Encoder selection and output options.
//!
//! Every encoder declares the frame state it accepts through
//! [`Encoder::required_input`]; the pipeline must deliver exactly that state.
//! Rate control syntax differs per backend and is produced by
//! [`Encoder::output_args`].

use channelcast_core::{FrameDataLocation, PixelFormat, SoftwareFormat, VideoCodec};
use serde::{Deserialize, Serialize};

use crate::profile::CapabilityProfile;
use crate::types::EncoderSettings;
use crate::HwAccelMode;

/// How the output video stream is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Encoder {
    /// Source packets are copied.
    Copy,
    /// Software encoder `name`.
    Software { codec: VideoCodec, name: String },
    /// Hardware encoder `name` on `mode`.
    Hardware {
        mode: HwAccelMode,
        codec: VideoCodec,
        name: String,
    },
}

/// Frame state an encoder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderInput {
    pub location: FrameDataLocation,
    pub pixel_format: PixelFormat,
}

impl Encoder {
    /// Pick the encoder for `codec`.
    ///
    /// Never fails: a codec the profile cannot encode gets the software
    /// encoder, and a codec nobody knows keeps its ffmpeg name.
    pub fn select(codec: &VideoCodec, profile: &CapabilityProfile) -> Self {
        match profile.encoder_for(codec) {
            Some(name) if profile.mode.is_hardware() => Encoder::Hardware {
                mode: profile.mode,
                codec: codec.clone(),
                name: name.to_string(),
            },
            Some(name) => Encoder::Software {
                codec: codec.clone(),
                name: name.to_string(),
            },
            None => {
                let software = CapabilityProfile::software();
                let name = software
                    .encoder_for(codec)
                    .unwrap_or_else(|| codec.ffmpeg_name());
                Encoder::Software {
                    codec: codec.clone(),
                    name: name.to_string(),
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Encoder::Copy => "copy",
            Encoder::Software { name, .. } | Encoder::Hardware { name, .. } => name.as_str(),
        }
    }

    pub fn mode(&self) -> HwAccelMode {
        match self {
            Encoder::Hardware { mode, .. } => *mode,
            Encoder::Copy | Encoder::Software { .. } => HwAccelMode::None,
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self, Encoder::Hardware { .. })
    }

    /// Frame state this encoder accepts when fed `layout`. `None` for copy.
    pub fn required_input(&self, layout: SoftwareFormat) -> Option<EncoderInput> {
        let (codec, mode) = match self {
            Encoder::Copy => return None,
            Encoder::Software { codec, .. } => (codec, HwAccelMode::None),
            Encoder::Hardware { mode, codec, .. } => (codec, *mode),
        };
        // these codecs are only produced at 8 bits
        let layout = match codec {
            VideoCodec::H264 | VideoCodec::Mpeg2 | VideoCodec::Mpeg4 => SoftwareFormat::Yuv420p,
            _ => layout,
        };
        let input = match mode.surface() {
            None => EncoderInput {
                location: FrameDataLocation::Software,
                pixel_format: PixelFormat::software(layout.software_native()),
            },
            Some(surface) if mode.filters_on_device() => EncoderInput {
                location: FrameDataLocation::Hardware,
                pixel_format: PixelFormat::hardware(surface, layout.hardware_native()),
            },
            Some(_) => EncoderInput {
                location: FrameDataLocation::Software,
                pixel_format: PixelFormat::software(layout.hardware_native()),
            },
        };
        Some(input)
    }

    /// Output options: codec, rate control and GOP.
    pub fn output_args(&self, settings: &EncoderSettings) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.name().to_string()];
        let (mode, name) = match self {
            Encoder::Copy => return args,
            Encoder::Software { name, .. } => (HwAccelMode::None, name.as_str()),
            Encoder::Hardware { mode, name, .. } => (*mode, name.as_str()),
        };
        let push = |args: &mut Vec<String>, items: &[&str]| {
            args.extend(items.iter().map(|s| s.to_string()));
        };
        let x26x = matches!(name, "libx264" | "libx265");

        match mode {
            HwAccelMode::None if x26x => push(&mut args, &["-preset", "veryfast"]),
            HwAccelMode::Cuda => push(&mut args, &["-preset", "p4"]),
            HwAccelMode::Qsv => push(&mut args, &["-preset", "veryfast", "-look_ahead", "0"]),
            HwAccelMode::VideoToolbox => push(&mut args, &["-realtime", "1", "-allow_sw", "1"]),
            _ => {}
        }

        match (settings.bitrate_kbps, settings.buffer_size()) {
            (Some(bitrate), Some(bufsize)) => {
                match mode {
                    HwAccelMode::Vaapi => push(&mut args, &["-rc_mode", "VBR"]),
                    HwAccelMode::Cuda => push(&mut args, &["-rc", "vbr"]),
                    _ => {}
                }
                let rate = format!("{}k", bitrate);
                args.extend(["-b:v".to_string(), rate.clone()]);
                if mode != HwAccelMode::VideoToolbox {
                    args.extend([
                        "-maxrate".to_string(),
                        rate,
                        "-bufsize".to_string(),
                        format!("{}k", bufsize),
                    ]);
                }
            }
            _ => match mode {
                HwAccelMode::None if x26x => push(&mut args, &["-crf", "23"]),
                HwAccelMode::Vaapi => push(&mut args, &["-rc_mode", "CQP", "-qp", "24"]),
                HwAccelMode::Cuda => push(&mut args, &["-rc", "constqp", "-qp", "23"]),
                HwAccelMode::Qsv => push(&mut args, &["-global_quality", "23"]),
                HwAccelMode::VideoToolbox => push(&mut args, &["-q:v", "65"]),
                HwAccelMode::None => {}
            },
        }

        if let Some(gop) = settings.gop_size {
            let gop = gop.to_string();
            args.extend(["-g".to_string(), gop.clone(), "-keyint_min".to_string(), gop]);
            if x26x {
                push(&mut args, &["-sc_threshold", "0"]);
            }
        }
        args
    }
}
