//! ffprobe document model.
//!
//! Mirrors `ffprobe -print_format json -show_streams -show_format` and turns
//! its entries into stream descriptors. ffprobe reports several numbers as
//! strings; they are parsed here so descriptors only hold typed values.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::format::{AudioCodec, VideoCodec};
use crate::pixel::SoftwareFormat;
use crate::rational::Rational;
use crate::stream::{AudioStream, FrameSize, ScanType, VideoStream};

/// Top-level ffprobe output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeDocument {
    #[serde(default)]
    pub streams: Vec<ProbedStream>,
    #[serde(default)]
    pub format: Option<ProbedFormat>,
}

/// One entry of the `streams` array. Every field is optional because ffprobe
/// omits what it cannot determine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbedStream {
    pub index: usize,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub profile: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pix_fmt: Option<String>,
    pub sample_aspect_ratio: Option<String>,
    pub display_aspect_ratio: Option<String>,
    pub field_order: Option<String>,
    pub color_transfer: Option<String>,
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
    pub channels: Option<u16>,
    pub sample_rate: Option<String>,
    pub bit_rate: Option<String>,
    pub duration: Option<String>,
}

/// The `format` object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbedFormat {
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
}

impl ProbeDocument {
    /// Parse raw ffprobe JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// All video streams, in probe order.
    pub fn video_streams(&self) -> Result<Vec<VideoStream>> {
        self.streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some("video"))
            .map(ProbedStream::to_video)
            .collect()
    }

    /// All audio streams, in probe order.
    pub fn audio_streams(&self) -> Result<Vec<AudioStream>> {
        let fallback = self
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(parse_seconds);
        self.streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some("audio"))
            .map(|s| {
                let mut stream = s.to_audio()?;
                if stream.duration.is_none() {
                    stream.duration = fallback;
                }
                Ok(stream)
            })
            .collect()
    }
}

impl ProbedStream {
    /// Build a video descriptor; codec and dimensions are required.
    pub fn to_video(&self) -> Result<VideoStream> {
        let codec = self
            .codec_name
            .as_deref()
            .ok_or(Error::missing(self.index, "codec_name"))?;
        let width = self.width.ok_or(Error::missing(self.index, "width"))?;
        let height = self.height.ok_or(Error::missing(self.index, "height"))?;
        if width == 0 || height == 0 {
            return Err(Error::InvalidDescriptorValue {
                index: self.index,
                field: "width/height",
                value: format!("{}x{}", width, height),
            });
        }

        let mut stream = VideoStream::new(
            self.index,
            VideoCodec::from_ffmpeg_name(codec),
            FrameSize::new(width, height),
        )
        .with_scan_type(ScanType::from_field_order(self.field_order.as_deref()));

        if let Some(format) = self.pix_fmt.as_deref().and_then(SoftwareFormat::from_name) {
            stream = stream.with_pixel_format(format);
        }
        if let Some(sar) = parse_ratio(self.sample_aspect_ratio.as_deref()) {
            stream = stream.with_sample_aspect_ratio(sar);
        }
        if let Some(dar) = parse_ratio(self.display_aspect_ratio.as_deref()) {
            stream = stream.with_display_aspect_ratio(dar);
        }
        let rate = parse_ratio(self.avg_frame_rate.as_deref())
            .or_else(|| parse_ratio(self.r_frame_rate.as_deref()));
        if let Some(rate) = rate {
            stream = stream.with_frame_rate(rate);
        }
        if let Some(transfer) = &self.color_transfer {
            stream = stream.with_color_transfer(transfer.clone());
        }
        if let Some(profile) = &self.profile {
            stream = stream.with_profile(profile.clone());
        }
        Ok(stream)
    }

    /// Build an audio descriptor; codec, channel count and sample rate are required.
    pub fn to_audio(&self) -> Result<AudioStream> {
        let codec = self
            .codec_name
            .as_deref()
            .ok_or(Error::missing(self.index, "codec_name"))?;
        let channels = self.channels.ok_or(Error::missing(self.index, "channels"))?;
        let raw_rate = self
            .sample_rate
            .as_deref()
            .ok_or(Error::missing(self.index, "sample_rate"))?;
        let sample_rate = raw_rate
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::InvalidDescriptorValue {
                index: self.index,
                field: "sample_rate",
                value: raw_rate.to_string(),
            })?;

        let mut stream = AudioStream::new(
            self.index,
            AudioCodec::from_ffmpeg_name(codec),
            channels,
            sample_rate,
        );
        if let Some(bitrate) = self.bit_rate.as_deref().and_then(|b| b.trim().parse().ok()) {
            stream = stream.with_bitrate(bitrate);
        }
        if let Some(duration) = self.duration.as_deref().and_then(parse_seconds) {
            stream = stream.with_duration(duration);
        }
        Ok(stream)
    }
}

/// ffprobe writes `0:1` / `0/0` for unknown ratios; those read as absent.
fn parse_ratio(value: Option<&str>) -> Option<Rational> {
    value
        .and_then(|v| v.parse::<Rational>().ok())
        .filter(|r| !r.is_zero())
}

fn parse_seconds(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_type": "video",
                "codec_name": "h264",
                "profile": "High",
                "width": 1920,
                "height": 1080,
                "pix_fmt": "yuv420p",
                "sample_aspect_ratio": "1:1",
                "display_aspect_ratio": "16:9",
                "field_order": "progressive",
                "color_transfer": "bt709",
                "r_frame_rate": "24000/1001",
                "avg_frame_rate": "24000/1001"
            },
            {
                "index": 1,
                "codec_type": "audio",
                "codec_name": "ac3",
                "channels": 6,
                "sample_rate": "48000",
                "bit_rate": "384000"
            },
            {
                "index": 2,
                "codec_type": "subtitle",
                "codec_name": "subrip"
            }
        ],
        "format": { "format_name": "matroska,webm", "duration": "1324.500000" }
    }"#;

    #[test]
    fn test_parse_video_stream() {
        let doc = ProbeDocument::from_json(SAMPLE).unwrap();
        let video = doc.video_streams().unwrap();
        assert_eq!(video.len(), 1);
        let v = &video[0];
        assert_eq!(v.codec, VideoCodec::H264);
        assert_eq!(v.frame_size, FrameSize::new(1920, 1080));
        assert_eq!(v.pixel_format, Some(SoftwareFormat::Yuv420p));
        assert_eq!(v.scan_type, ScanType::Progressive);
        assert!(!v.is_anamorphic);
        assert_eq!(v.frame_rate, Rational::new(24000, 1001));
    }

    #[test]
    fn test_audio_inherits_container_duration() {
        let doc = ProbeDocument::from_json(SAMPLE).unwrap();
        let audio = doc.audio_streams().unwrap();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].codec, AudioCodec::Ac3);
        assert_eq!(audio[0].channels, 6);
        assert_eq!(audio[0].bitrate, Some(384_000));
        assert_eq!(audio[0].duration, Some(Duration::from_secs_f64(1324.5)));
    }

    #[test]
    fn test_missing_dimensions_is_incomplete() {
        let stream = ProbedStream {
            index: 3,
            codec_type: Some("video".into()),
            codec_name: Some("hevc".into()),
            width: Some(1280),
            ..Default::default()
        };
        let err = stream.to_video().unwrap_err();
        assert!(matches!(
            err,
            Error::IncompleteStreamDescriptor { index: 3, field: "height" }
        ));
    }

    #[test]
    fn test_bad_sample_rate_is_invalid() {
        let stream = ProbedStream {
            index: 1,
            codec_type: Some("audio".into()),
            codec_name: Some("aac".into()),
            channels: Some(2),
            sample_rate: Some("fast".into()),
            ..Default::default()
        };
        assert!(matches!(
            stream.to_audio(),
            Err(Error::InvalidDescriptorValue { field: "sample_rate", .. })
        ));
    }

    #[test]
    fn test_unknown_sar_is_ignored() {
        let stream = ProbedStream {
            index: 0,
            codec_type: Some("video".into()),
            codec_name: Some("mpeg2video".into()),
            width: Some(720),
            height: Some(480),
            sample_aspect_ratio: Some("0:1".into()),
            field_order: Some("tt".into()),
            ..Default::default()
        };
        let v = stream.to_video().unwrap();
        assert_eq!(v.sample_aspect_ratio, None);
        assert!(v.scan_type.is_interlaced());
    }
}
