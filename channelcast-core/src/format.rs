//! Codec and container registry.
//!
//! Names follow the ffprobe/ffmpeg vocabulary so probe output and emitted
//! arguments share one spelling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Video codec type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VideoCodec {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    Hevc,
    /// MPEG-2 video.
    Mpeg2,
    /// MPEG-4 part 2.
    Mpeg4,
    /// VC-1.
    Vc1,
    /// VP9.
    Vp9,
    /// AV1.
    Av1,
    /// Anything else, kept by name.
    Other(String),
}

impl VideoCodec {
    /// Map an ffprobe `codec_name` to a codec. Unknown names are kept, never rejected.
    pub fn from_ffmpeg_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" | "avc1" => Self::H264,
            "hevc" | "h265" | "hvc1" => Self::Hevc,
            "mpeg2video" | "mpeg2" => Self::Mpeg2,
            "mpeg4" => Self::Mpeg4,
            "vc1" | "wmv3" => Self::Vc1,
            "vp9" => Self::Vp9,
            "av1" => Self::Av1,
            other => Self::Other(other.to_string()),
        }
    }

    /// The ffmpeg codec name.
    pub fn ffmpeg_name(&self) -> &str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::Mpeg2 => "mpeg2video",
            Self::Mpeg4 => "mpeg4",
            Self::Vc1 => "vc1",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::Other(name) => name,
        }
    }

    /// Check if the codec is one of the known set.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for VideoCodec {
    fn from(s: String) -> Self {
        Self::from_ffmpeg_name(&s)
    }
}

impl From<&str> for VideoCodec {
    fn from(s: &str) -> Self {
        Self::from_ffmpeg_name(s)
    }
}

impl From<VideoCodec> for String {
    fn from(codec: VideoCodec) -> Self {
        codec.ffmpeg_name().to_string()
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

/// Audio codec type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AudioCodec {
    /// AAC (Advanced Audio Coding).
    Aac,
    /// AC-3 (Dolby Digital).
    Ac3,
    /// E-AC-3 (Enhanced AC-3).
    Eac3,
    /// MP3 (MPEG Layer 3).
    Mp3,
    /// Opus.
    Opus,
    /// FLAC (Free Lossless Audio Codec).
    Flac,
    /// Anything else, kept by name.
    Other(String),
}

impl AudioCodec {
    /// Map an ffprobe `codec_name` to a codec.
    pub fn from_ffmpeg_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "aac" => Self::Aac,
            "ac3" => Self::Ac3,
            "eac3" => Self::Eac3,
            "mp3" => Self::Mp3,
            "opus" => Self::Opus,
            "flac" => Self::Flac,
            other => Self::Other(other.to_string()),
        }
    }

    /// The ffmpeg codec name.
    pub fn ffmpeg_name(&self) -> &str {
        match self {
            Self::Aac => "aac",
            Self::Ac3 => "ac3",
            Self::Eac3 => "eac3",
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Flac => "flac",
            Self::Other(name) => name,
        }
    }

    /// The ffmpeg encoder used when this codec is produced.
    pub fn encoder_name(&self) -> &str {
        match self {
            Self::Mp3 => "libmp3lame",
            Self::Opus => "libopus",
            other => other.ffmpeg_name(),
        }
    }

    /// Check if this is a lossless codec.
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Flac)
    }
}

impl From<String> for AudioCodec {
    fn from(s: String) -> Self {
        Self::from_ffmpeg_name(&s)
    }
}

impl From<&str> for AudioCodec {
    fn from(s: &str) -> Self {
        Self::from_ffmpeg_name(s)
    }
}

impl From<AudioCodec> for String {
    fn from(codec: AudioCodec) -> Self {
        codec.ffmpeg_name().to_string()
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// MPEG Transport Stream.
    #[default]
    #[serde(alias = "ts")]
    MpegTs,
    /// ISO Base Media File Format.
    Mp4,
    /// Matroska container.
    #[serde(alias = "mkv")]
    Matroska,
    /// NUT, ffmpeg's own low-overhead container.
    Nut,
}

impl ContainerFormat {
    /// The muxer name passed to `-f`.
    pub fn muxer_name(&self) -> &'static str {
        match self {
            Self::MpegTs => "mpegts",
            Self::Mp4 => "mp4",
            Self::Matroska => "matroska",
            Self::Nut => "nut",
        }
    }

    /// Try to detect format from a muxer name or file extension.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mpegts" | "ts" | "m2ts" => Some(Self::MpegTs),
            "mp4" | "m4v" | "mov" => Some(Self::Mp4),
            "matroska" | "mkv" => Some(Self::Matroska),
            "nut" => Some(Self::Nut),
            _ => None,
        }
    }

    /// Check whether the muxer can carry the video codec.
    pub fn supports_video(&self, codec: &VideoCodec) -> bool {
        match self {
            Self::MpegTs => matches!(
                codec,
                VideoCodec::H264 | VideoCodec::Hevc | VideoCodec::Mpeg2 | VideoCodec::Av1
            ),
            Self::Mp4 => matches!(
                codec,
                VideoCodec::H264
                    | VideoCodec::Hevc
                    | VideoCodec::Mpeg4
                    | VideoCodec::Vp9
                    | VideoCodec::Av1
            ),
            Self::Matroska | Self::Nut => true,
        }
    }

    /// Check whether the muxer can carry the audio codec.
    pub fn supports_audio(&self, codec: &AudioCodec) -> bool {
        match self {
            Self::MpegTs => matches!(
                codec,
                AudioCodec::Aac | AudioCodec::Ac3 | AudioCodec::Eac3 | AudioCodec::Mp3
            ),
            Self::Mp4 => !matches!(codec, AudioCodec::Other(_)),
            Self::Matroska | Self::Nut => true,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.muxer_name())
    }
}
