//! Transcode request model.
//!
//! A request says what the output should look like; it knows nothing about
//! the inputs. [`MediaInput`] binds probed descriptors to an input URL.

use channelcast_core::{
    AudioCodec, AudioStream, ContainerFormat, FrameSize, Rational, SoftwareFormat, VideoCodec,
    VideoStream,
};
use channelcast_hwaccel::{EncoderSettings, HwAccelMode};
use serde::{Deserialize, Serialize};

/// Target of a single transcoder invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeRequest {
    pub container: ContainerFormat,
    /// Output URL; `pipe:1` writes to stdout.
    pub target: String,
    /// Overrides the mode from hardware settings.
    pub hwaccel: Option<HwAccelMode>,
    /// `None` drops video from the output.
    pub video: Option<VideoOutputSpec>,
    /// `None` drops audio from the output.
    pub audio: Option<AudioOutputSpec>,
    pub input: InputSettings,
    pub threads: Option<u32>,
    pub log_level: String,
}

impl Default for TranscodeRequest {
    fn default() -> Self {
        Self {
            container: ContainerFormat::MpegTs,
            target: "pipe:1".to_string(),
            hwaccel: None,
            video: Some(VideoOutputSpec::default()),
            audio: Some(AudioOutputSpec::default()),
            input: InputSettings::default(),
            threads: None,
            log_level: "error".to_string(),
        }
    }
}

impl TranscodeRequest {
    pub fn new(video: VideoOutputSpec, audio: AudioOutputSpec) -> Self {
        Self {
            video: Some(video),
            audio: Some(audio),
            ..Default::default()
        }
    }

    /// Video-only request.
    pub fn video_only(video: VideoOutputSpec) -> Self {
        Self {
            video: Some(video),
            audio: None,
            ..Default::default()
        }
    }

    pub fn with_container(mut self, container: ContainerFormat) -> Self {
        self.container = container;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_hwaccel(mut self, mode: HwAccelMode) -> Self {
        self.hwaccel = Some(mode);
        self
    }

    pub fn with_input(mut self, input: InputSettings) -> Self {
        self.input = input;
        self
    }
}

/// Output video parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoOutputSpec {
    pub codec: VideoCodec,
    /// Output canvas. The picture is fitted inside and padded to it.
    pub frame_size: Option<FrameSize>,
    /// Layout handed to the encoder; defaults to the source layout.
    pub pixel_format: Option<SoftwareFormat>,
    pub frame_rate: Option<Rational>,
    pub bitrate_kbps: Option<u32>,
    pub buffer_size_kbps: Option<u32>,
    pub gop_size: Option<u32>,
    /// Interlaced sources must be deinterlaced.
    pub deinterlace: bool,
    /// Copy the stream when it already matches.
    pub allow_passthrough: bool,
}

impl Default for VideoOutputSpec {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            frame_size: None,
            pixel_format: None,
            frame_rate: None,
            bitrate_kbps: None,
            buffer_size_kbps: None,
            gop_size: None,
            deinterlace: true,
            allow_passthrough: false,
        }
    }
}

impl VideoOutputSpec {
    pub fn new(codec: VideoCodec) -> Self {
        Self {
            codec,
            ..Default::default()
        }
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some(FrameSize::new(width, height));
        self
    }

    pub fn with_pixel_format(mut self, format: SoftwareFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }

    pub fn with_frame_rate(mut self, rate: Rational) -> Self {
        self.frame_rate = Some(rate);
        self
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = Some(kbps);
        self
    }

    pub fn with_gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = Some(gop_size);
        self
    }

    pub fn with_passthrough(mut self) -> Self {
        self.allow_passthrough = true;
        self
    }

    /// Rate control settings for the encoder.
    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            bitrate_kbps: self.bitrate_kbps,
            buffer_size_kbps: self.buffer_size_kbps,
            gop_size: self.gop_size,
        }
    }

    /// Check whether `stream` can be copied unchanged.
    pub fn matches_source(&self, stream: &VideoStream) -> bool {
        self.allow_passthrough
            && self.codec == stream.codec
            && self.frame_size.map_or(true, |size| size == stream.frame_size)
            && self
                .pixel_format
                .map_or(true, |format| Some(format) == stream.pixel_format)
            && self.frame_rate.map_or(true, |rate| Some(rate) == stream.frame_rate)
            && !(self.deinterlace && stream.scan_type.is_interlaced())
    }
}

/// Output audio parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioOutputSpec {
    pub codec: AudioCodec,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
    pub bitrate_kbps: Option<u32>,
    pub normalize_loudness: bool,
    /// Pad with silence to the input duration.
    pub pad_silence: bool,
    pub allow_passthrough: bool,
}

impl Default for AudioOutputSpec {
    fn default() -> Self {
        Self {
            codec: AudioCodec::Aac,
            channels: Some(2),
            sample_rate: Some(48_000),
            bitrate_kbps: Some(192),
            normalize_loudness: false,
            pad_silence: false,
            allow_passthrough: false,
        }
    }
}

impl AudioOutputSpec {
    pub fn new(codec: AudioCodec) -> Self {
        Self {
            codec,
            ..Default::default()
        }
    }

    /// Check whether `stream` can be copied unchanged.
    pub fn matches_source(&self, stream: &AudioStream) -> bool {
        self.allow_passthrough
            && !self.normalize_loudness
            && !self.pad_silence
            && self.codec == stream.codec
            && self.channels.map_or(true, |c| c == stream.channels)
            && self.sample_rate.map_or(true, |r| r == stream.sample_rate)
    }
}

/// How inputs are read.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Read at native frame rate.
    pub realtime: bool,
    /// Seek offset in seconds.
    pub start: Option<f64>,
    /// Read limit in seconds.
    pub duration: Option<f64>,
}

/// One transcoder input and the streams probed from it.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInput {
    pub path: String,
    pub video: Option<VideoStream>,
    pub audio: Option<AudioStream>,
}

impl MediaInput {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            video: None,
            audio: None,
        }
    }

    pub fn with_video(mut self, stream: VideoStream) -> Self {
        self.video = Some(stream);
        self
    }

    pub fn with_audio(mut self, stream: AudioStream) -> Self {
        self.audio = Some(stream);
        self
    }
}
