//! Filter transitions for video and audio.
//!
//! Every video filter is a pure function from a frame state to a filter-graph
//! fragment and the next frame state. Syntax depends on where the frames live
//! when the filter runs, so the same [`VideoFilter::Scale`] renders as
//! `scale`, `scale_vaapi`, `scale_cuda` or `scale_qsv`.

use channelcast_core::{FrameDataLocation, FrameSize, FrameState, HardwareSurface, SoftwareFormat};
use channelcast_hwaccel::HwAccelMode;
use serde::Serialize;

use crate::error::PipelineError;
use crate::reconcile::TargetState;
use crate::Result;

/// A state-affecting video filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum VideoFilter {
    /// Move frames from system memory onto `mode`'s surfaces.
    HardwareUpload { mode: HwAccelMode },
    /// Move frames back into system memory.
    HardwareDownload,
    Deinterlace,
    /// Resize the picture, optionally converting the layout in the same pass.
    /// Format folding is only available on device.
    Scale {
        size: FrameSize,
        format: Option<SoftwareFormat>,
    },
    /// Center the picture on a black canvas. System memory only.
    Pad { size: FrameSize },
    FormatConversion { format: SoftwareFormat },
    /// Closing conversion to exactly the encoder's input.
    Conform { mode: HwAccelMode, target: TargetState },
}

impl VideoFilter {
    /// Step identifier used in logs and errors.
    pub fn id(&self) -> &'static str {
        match self {
            VideoFilter::HardwareUpload { .. } => "hwupload",
            VideoFilter::HardwareDownload => "hwdownload",
            VideoFilter::Deinterlace => "deinterlace",
            VideoFilter::Scale { .. } => "scale",
            VideoFilter::Pad { .. } => "pad",
            VideoFilter::FormatConversion { .. } => "format",
            VideoFilter::Conform { .. } => "conform",
        }
    }

    /// Where frames must be for this filter to run with `mode`.
    ///
    /// `None` means the filter runs wherever the frames already are.
    pub fn required_location(&self, mode: HwAccelMode) -> Option<FrameDataLocation> {
        match self {
            VideoFilter::Deinterlace | VideoFilter::Scale { .. } if mode.filters_on_device() => {
                Some(FrameDataLocation::Hardware)
            }
            VideoFilter::Deinterlace | VideoFilter::Scale { .. } | VideoFilter::Pad { .. } => {
                Some(FrameDataLocation::Software)
            }
            VideoFilter::HardwareUpload { .. }
            | VideoFilter::HardwareDownload
            | VideoFilter::FormatConversion { .. }
            | VideoFilter::Conform { .. } => None,
        }
    }

    /// Render the fragment for `state` and compute the state it produces.
    pub fn apply(&self, state: &FrameState) -> Result<(String, FrameState)> {
        match self {
            VideoFilter::HardwareUpload { mode } => upload(*mode, state),
            VideoFilter::HardwareDownload => download(state),
            VideoFilter::Deinterlace => {
                let fragment = match state.surface() {
                    None => "yadif=1",
                    Some(HardwareSurface::Vaapi) => "deinterlace_vaapi",
                    Some(HardwareSurface::Cuda) => "yadif_cuda",
                    Some(HardwareSurface::Qsv) => "deinterlace_qsv",
                    Some(HardwareSurface::VideoToolbox) => {
                        return Err(PipelineError::transition(
                            self.id(),
                            "no deinterlacer for VideoToolbox surfaces",
                        ));
                    }
                };
                Ok((fragment.to_string(), state.with_deinterlaced()))
            }
            VideoFilter::Scale { size, format } => scale(*size, *format, state),
            VideoFilter::Pad { size } => {
                if state.location.is_hardware() {
                    return Err(PipelineError::transition(
                        self.id(),
                        "padding needs frames in system memory",
                    ));
                }
                if size.width < state.scaled_size.width || size.height < state.scaled_size.height {
                    return Err(PipelineError::transition(
                        self.id(),
                        format!("canvas {} smaller than picture {}", size, state.scaled_size),
                    ));
                }
                let fragment = format!(
                    "pad={}:{}:(ow-iw)/2:(oh-ih)/2:color=black",
                    size.width, size.height
                );
                Ok((fragment, state.with_padded_size(*size)))
            }
            VideoFilter::FormatConversion { format } => convert(*format, state),
            VideoFilter::Conform { mode, target } => conform(*mode, target, state),
        }
    }
}

fn device_filter(surface: HardwareSurface, step: &'static str) -> Result<&'static str> {
    match surface {
        HardwareSurface::Vaapi => Ok("scale_vaapi"),
        HardwareSurface::Cuda => Ok("scale_cuda"),
        HardwareSurface::Qsv => Ok("scale_qsv"),
        HardwareSurface::VideoToolbox => Err(PipelineError::transition(
            step,
            "VideoToolbox surfaces cannot be filtered on device",
        )),
    }
}

fn upload(mode: HwAccelMode, state: &FrameState) -> Result<(String, FrameState)> {
    let step = "hwupload";
    if state.location.is_hardware() {
        return Err(PipelineError::transition(step, "frames are already on device"));
    }
    let layout = state
        .software_format()
        .ok_or_else(|| PipelineError::transition(step, "source pixel format is unknown"))?;
    let (surface, fragment) = match mode.surface() {
        Some(HardwareSurface::Vaapi) => (HardwareSurface::Vaapi, "hwupload"),
        Some(HardwareSurface::Cuda) => (HardwareSurface::Cuda, "hwupload_cuda"),
        Some(HardwareSurface::Qsv) => (HardwareSurface::Qsv, "hwupload=extra_hw_frames=64"),
        Some(HardwareSurface::VideoToolbox) | None => {
            return Err(PipelineError::transition(
                step,
                format!("{} does not filter on device", mode.name()),
            ));
        }
    };
    Ok((fragment.to_string(), state.with_hardware_frames(surface, layout)))
}

fn download(state: &FrameState) -> Result<(String, FrameState)> {
    let step = "hwdownload";
    if !state.location.is_hardware() {
        return Err(PipelineError::transition(step, "frames are already in system memory"));
    }
    let layout = state
        .software_format()
        .ok_or_else(|| PipelineError::transition(step, "surface layout is unknown"))?;
    Ok((
        format!("hwdownload,format={}", layout),
        state.with_software_frames(layout),
    ))
}

fn scale(
    size: FrameSize,
    format: Option<SoftwareFormat>,
    state: &FrameState,
) -> Result<(String, FrameState)> {
    let step = "scale";
    let next = state.with_scaled_size(size);
    match state.surface() {
        None => {
            if format.is_some() {
                return Err(PipelineError::transition(
                    step,
                    "software scaling does not convert formats",
                ));
            }
            Ok((
                format!("scale={}:{}:flags=bicubic", size.width, size.height),
                next,
            ))
        }
        Some(surface) => {
            let name = device_filter(surface, step)?;
            let mut fragment = format!("{}=w={}:h={}", name, size.width, size.height);
            let next = match format {
                Some(format) => {
                    fragment.push_str(&format!(":format={}", format));
                    next.with_pixel_format(format)
                }
                None => next,
            };
            Ok((fragment, next))
        }
    }
}

fn convert(format: SoftwareFormat, state: &FrameState) -> Result<(String, FrameState)> {
    let fragment = match state.surface() {
        None => format!("format={}", format),
        Some(surface) => format!("{}=format={}", device_filter(surface, "format")?, format),
    };
    Ok((fragment, state.with_pixel_format(format)))
}

fn conform(
    mode: HwAccelMode,
    target: &TargetState,
    state: &FrameState,
) -> Result<(String, FrameState)> {
    let layout = target.layout();
    let mut fragments = Vec::new();
    let mut next = state.clone();

    if next.location.is_hardware() && !target.location.is_hardware() {
        let (fragment, downloaded) = download(&next)?;
        fragments.push(fragment);
        next = downloaded;
    }
    if !next.location.is_hardware() && target.location.is_hardware() {
        if next.software_format() != Some(layout) {
            let (fragment, converted) = convert(layout, &next)?;
            fragments.push(fragment);
            next = converted;
        }
        let (fragment, uploaded) = upload(mode, &next)?;
        fragments.push(fragment);
        next = uploaded;
    }
    if next.software_format() != Some(layout) {
        let (fragment, converted) = convert(layout, &next)?;
        fragments.push(fragment);
        next = converted;
    }
    Ok((fragments.join(","), next))
}

/// An audio filter. Audio filters never touch the video frame state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum AudioFilter {
    /// Stretch and squeeze samples to match timestamps.
    Resample,
    /// EBU R128 loudness normalization.
    Loudnorm,
    /// Append silence up to `duration` seconds.
    PadSilence { duration: f64 },
}

impl AudioFilter {
    pub fn id(&self) -> &'static str {
        match self {
            AudioFilter::Resample => "aresample",
            AudioFilter::Loudnorm => "loudnorm",
            AudioFilter::PadSilence { .. } => "apad",
        }
    }

    pub fn fragment(&self) -> String {
        match self {
            AudioFilter::Resample => "aresample=async=1".to_string(),
            AudioFilter::Loudnorm => "loudnorm=I=-16:TP=-1.5:LRA=11".to_string(),
            AudioFilter::PadSilence { duration } => format!("apad=whole_dur={:.3}", duration),
        }
    }
}

/// Ordered fragments of one filter-graph chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    fragments: Vec<String>,
}

impl FilterChain {
    /// Create a new empty filter chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment to the chain. Empty fragments are dropped.
    pub fn add(&mut self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        if !fragment.is_empty() {
            self.fragments.push(fragment);
        }
    }

    /// Get number of fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Check if chain is empty.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Fragments joined with `,`; `None` when empty.
    pub fn text(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.fragments.join(","))
    }

    /// Chain between two pad labels, e.g. `[0:0]yadif=1[vout]`.
    pub fn labeled(&self, input: &str, output: &str) -> Option<String> {
        self.text()
            .map(|text| format!("[{}]{}[{}]", input, text, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channelcast_core::{PixelFormat, ScanType, VideoCodec, VideoStream};
    use channelcast_hwaccel::EncoderInput;

    fn software_state(width: u32, height: u32) -> FrameState {
        let stream = VideoStream::new(0, VideoCodec::H264, FrameSize::new(width, height))
            .with_pixel_format(SoftwareFormat::Yuv420p)
            .with_scan_type(ScanType::Interlaced);
        FrameState::from_stream(&stream, false)
    }

    #[test]
    fn test_software_scale() {
        let state = software_state(1920, 1080);
        let filter = VideoFilter::Scale {
            size: FrameSize::new(1280, 720),
            format: None,
        };
        let (fragment, next) = filter.apply(&state).unwrap();
        assert_eq!(fragment, "scale=1280:720:flags=bicubic");
        assert_eq!(next.scaled_size, FrameSize::new(1280, 720));
        assert_eq!(next.padded_size, FrameSize::new(1280, 720));
        // input state untouched
        assert_eq!(state.scaled_size, FrameSize::new(1920, 1080));
    }

    #[test]
    fn test_software_scale_rejects_format() {
        let filter = VideoFilter::Scale {
            size: FrameSize::new(1280, 720),
            format: Some(SoftwareFormat::Nv12),
        };
        let err = filter.apply(&software_state(1920, 1080)).unwrap_err();
        assert!(matches!(err, PipelineError::TransitionFailed { ref step, .. } if step == "scale"));
    }

    #[test]
    fn test_device_scale_with_format() {
        let state = software_state(720, 480);
        let (upload, state) = VideoFilter::HardwareUpload {
            mode: HwAccelMode::Vaapi,
        }
        .apply(&state)
        .unwrap();
        assert_eq!(upload, "hwupload");
        assert_eq!(
            state.pixel_format,
            Some(PixelFormat::hardware(HardwareSurface::Vaapi, SoftwareFormat::Yuv420p))
        );

        let (fragment, next) = VideoFilter::Scale {
            size: FrameSize::new(1280, 720),
            format: Some(SoftwareFormat::Nv12),
        }
        .apply(&state)
        .unwrap();
        assert_eq!(fragment, "scale_vaapi=w=1280:h=720:format=nv12");
        assert_eq!(
            next.pixel_format,
            Some(PixelFormat::hardware(HardwareSurface::Vaapi, SoftwareFormat::Nv12))
        );
        next.validate().unwrap();
    }

    #[test]
    fn test_deinterlace_syntax_follows_location() {
        let state = software_state(720, 480);
        let (fragment, next) = VideoFilter::Deinterlace.apply(&state).unwrap();
        assert_eq!(fragment, "yadif=1");
        assert!(!next.is_interlaced());

        let on_cuda = state.with_hardware_frames(HardwareSurface::Cuda, SoftwareFormat::Nv12);
        let (fragment, _) = VideoFilter::Deinterlace.apply(&on_cuda).unwrap();
        assert_eq!(fragment, "yadif_cuda");

        let on_qsv = state.with_hardware_frames(HardwareSurface::Qsv, SoftwareFormat::Nv12);
        let (fragment, _) = VideoFilter::Deinterlace.apply(&on_qsv).unwrap();
        assert_eq!(fragment, "deinterlace_qsv");
    }

    #[test]
    fn test_pad() {
        let state = software_state(1920, 1080).with_scaled_size(FrameSize::new(960, 720));
        let (fragment, next) = VideoFilter::Pad {
            size: FrameSize::new(1280, 720),
        }
        .apply(&state)
        .unwrap();
        assert_eq!(fragment, "pad=1280:720:(ow-iw)/2:(oh-ih)/2:color=black");
        assert_eq!(next.padded_size, FrameSize::new(1280, 720));
        assert_eq!(next.scaled_size, FrameSize::new(960, 720));

        let on_device = state.with_hardware_frames(HardwareSurface::Vaapi, SoftwareFormat::Nv12);
        assert!(VideoFilter::Pad {
            size: FrameSize::new(1280, 720)
        }
        .apply(&on_device)
        .is_err());
    }

    #[test]
    fn test_upload_syntax() {
        let state = software_state(1280, 720);
        let (cuda, _) = VideoFilter::HardwareUpload {
            mode: HwAccelMode::Cuda,
        }
        .apply(&state)
        .unwrap();
        assert_eq!(cuda, "hwupload_cuda");
        let (qsv, _) = VideoFilter::HardwareUpload {
            mode: HwAccelMode::Qsv,
        }
        .apply(&state)
        .unwrap();
        assert_eq!(qsv, "hwupload=extra_hw_frames=64");
        assert!(VideoFilter::HardwareUpload {
            mode: HwAccelMode::VideoToolbox
        }
        .apply(&state)
        .is_err());
    }

    #[test]
    fn test_upload_needs_known_layout() {
        let stream = VideoStream::new(0, VideoCodec::H264, FrameSize::new(640, 480));
        let state = FrameState::from_stream(&stream, false);
        let err = VideoFilter::HardwareUpload {
            mode: HwAccelMode::Vaapi,
        }
        .apply(&state)
        .unwrap_err();
        assert!(err.to_string().contains("unknown"));
    }

    #[test]
    fn test_download() {
        let state = software_state(1280, 720).with_hardware_frames(HardwareSurface::Cuda, SoftwareFormat::Nv12);
        let (fragment, next) = VideoFilter::HardwareDownload.apply(&state).unwrap();
        assert_eq!(fragment, "hwdownload,format=nv12");
        assert_eq!(next.location, FrameDataLocation::Software);
        assert_eq!(next.pixel_format, Some(PixelFormat::software(SoftwareFormat::Nv12)));
    }

    #[test]
    fn test_format_conversion_on_device() {
        let state = software_state(1280, 720).with_hardware_frames(HardwareSurface::Vaapi, SoftwareFormat::Yuv420p);
        let (fragment, _) = VideoFilter::FormatConversion {
            format: SoftwareFormat::Nv12,
        }
        .apply(&state)
        .unwrap();
        assert_eq!(fragment, "scale_vaapi=format=nv12");
    }

    #[test]
    fn test_conform_download_and_convert() {
        let state = software_state(1280, 720).with_hardware_frames(HardwareSurface::Cuda, SoftwareFormat::Nv12);
        let size = FrameSize::new(1280, 720);
        let target = TargetState::new(
            size,
            size,
            EncoderInput {
                location: FrameDataLocation::Software,
                pixel_format: PixelFormat::software(SoftwareFormat::Yuv420p),
            },
        );
        let (fragment, next) = VideoFilter::Conform {
            mode: HwAccelMode::Cuda,
            target,
        }
        .apply(&state)
        .unwrap();
        assert_eq!(fragment, "hwdownload,format=nv12,format=yuv420p");
        assert_eq!(next.pixel_format, Some(target.pixel_format));
    }

    #[test]
    fn test_conform_upload() {
        let stream = VideoStream::new(0, VideoCodec::H264, FrameSize::new(640, 480));
        let state = FrameState::from_stream(&stream, false);
        let size = FrameSize::new(640, 480);
        let target = TargetState::new(
            size,
            size,
            EncoderInput {
                location: FrameDataLocation::Hardware,
                pixel_format: PixelFormat::hardware(HardwareSurface::Vaapi, SoftwareFormat::Nv12),
            },
        );
        let (fragment, next) = VideoFilter::Conform {
            mode: HwAccelMode::Vaapi,
            target,
        }
        .apply(&state)
        .unwrap();
        assert_eq!(fragment, "format=nv12,hwupload");
        assert_eq!(next.pixel_format, Some(target.pixel_format));
        assert_eq!(next.location, FrameDataLocation::Hardware);
    }

    #[test]
    fn test_audio_fragments() {
        assert_eq!(AudioFilter::Resample.fragment(), "aresample=async=1");
        assert_eq!(
            AudioFilter::PadSilence { duration: 1800.0 }.fragment(),
            "apad=whole_dur=1800.000"
        );
    }

    #[test]
    fn test_filter_chain_labels() {
        let mut chain = FilterChain::new();
        assert_eq!(chain.labeled("0:0", "vout"), None);
        chain.add("yadif=1");
        chain.add("");
        chain.add("scale=1280:720:flags=bicubic");
        assert_eq!(chain.len(), 2);
        assert_eq!(
            chain.labeled("0:0", "vout").as_deref(),
            Some("[0:0]yadif=1,scale=1280:720:flags=bicubic[vout]")
        );
    }
}
