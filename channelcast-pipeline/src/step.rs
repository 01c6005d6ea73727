//! Pipeline steps.
//!
//! A step is one contribution to the transcoder command: a global option, an
//! option block for one input, an output option, a filter or an environment
//! variable. Each variant decides from a [`StepContext`] whether it applies
//! and what it contributes.

use channelcast_core::{AudioStream, ContainerFormat, FrameState, VideoStream};
use channelcast_hwaccel::{CapabilityProfile, Decoder, Encoder};
use serde::Serialize;

use crate::error::PipelineError;
use crate::filter::{AudioFilter, VideoFilter};
use crate::reconcile::{self, TargetState};
use crate::request::{MediaInput, TranscodeRequest};
use crate::Result;

/// Coarse classification of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Global,
    Input,
    Output,
    Filter,
    Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalOption {
    HideBanner,
    NoStats,
    NoStdin,
    LogLevel,
    Threads,
    /// `-init_hw_device` and `-filter_hw_device` for the effective backend.
    HardwareDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputOption {
    Realtime,
    Seek,
    Duration,
    /// `-hwaccel` options for the input carrying the video stream.
    HardwareDecode,
    /// `-i`, always last in the block.
    Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputOption {
    MapVideo,
    VideoCodec,
    FrameRate,
    NoVideo,
    MapAudio,
    AudioCodec,
    NoAudio,
    Muxer,
    MuxerFlags,
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentVariable {
    /// `LIBVA_DRIVER_NAME` for VA-API backed devices.
    VaapiDriver,
}

impl GlobalOption {
    pub fn name(&self) -> &'static str {
        match self {
            GlobalOption::HideBanner => "hide_banner",
            GlobalOption::NoStats => "nostats",
            GlobalOption::NoStdin => "nostdin",
            GlobalOption::LogLevel => "loglevel",
            GlobalOption::Threads => "threads",
            GlobalOption::HardwareDevice => "hw_device",
        }
    }
}

impl InputOption {
    pub fn name(&self) -> &'static str {
        match self {
            InputOption::Realtime => "realtime",
            InputOption::Seek => "seek",
            InputOption::Duration => "duration",
            InputOption::HardwareDecode => "hwaccel",
            InputOption::Source => "source",
        }
    }
}

impl OutputOption {
    pub fn name(&self) -> &'static str {
        match self {
            OutputOption::MapVideo => "map_video",
            OutputOption::VideoCodec => "video_codec",
            OutputOption::FrameRate => "frame_rate",
            OutputOption::NoVideo => "no_video",
            OutputOption::MapAudio => "map_audio",
            OutputOption::AudioCodec => "audio_codec",
            OutputOption::NoAudio => "no_audio",
            OutputOption::Muxer => "muxer",
            OutputOption::MuxerFlags => "movflags",
            OutputOption::Target => "target",
        }
    }
}

impl EnvironmentVariable {
    pub fn name(&self) -> &'static str {
        match self {
            EnvironmentVariable::VaapiDriver => "libva_driver",
        }
    }
}

/// One step of the command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "step", rename_all = "snake_case")]
pub enum PipelineStep {
    Global(GlobalOption),
    Input { input: usize, option: InputOption },
    Output(OutputOption),
    VideoFilter(VideoFilter),
    AudioFilter(AudioFilter),
    Environment(EnvironmentVariable),
}

/// What a step adds to the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contribution {
    Args(Vec<String>),
    /// Filter-graph fragment.
    Fragment(String),
    Environment(Vec<(String, String)>),
}

/// Everything a step may inspect.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub request: &'a TranscodeRequest,
    pub inputs: &'a [MediaInput],
    pub profile: &'a CapabilityProfile,
    /// Input index and descriptor of the selected video stream.
    pub video: Option<(usize, &'a VideoStream)>,
    /// Input index and descriptor of the selected audio stream.
    pub audio: Option<(usize, &'a AudioStream)>,
    pub decoder: Option<&'a Decoder>,
    pub encoder: Option<&'a Encoder>,
    pub audio_copy: bool,
    /// Running frame state during the filter fold.
    pub state: Option<&'a FrameState>,
    pub target: Option<&'a TargetState>,
    /// Video leaves through a filter graph.
    pub video_filtered: bool,
    pub audio_filtered: bool,
}

impl<'a> StepContext<'a> {
    pub fn new(
        request: &'a TranscodeRequest,
        inputs: &'a [MediaInput],
        profile: &'a CapabilityProfile,
    ) -> Self {
        Self {
            request,
            inputs,
            profile,
            video: None,
            audio: None,
            decoder: None,
            encoder: None,
            audio_copy: false,
            state: None,
            target: None,
            video_filtered: false,
            audio_filtered: false,
        }
    }

    /// Copy of the context observing `state`.
    pub fn at(&self, state: &'a FrameState) -> Self {
        Self {
            state: Some(state),
            ..*self
        }
    }

    fn uses_hardware(&self) -> bool {
        self.decoder.map_or(false, Decoder::is_hardware)
            || self.encoder.map_or(false, Encoder::is_hardware)
    }

    fn video_map(&self) -> Option<String> {
        let (input, stream) = self.video?;
        Some(if self.video_filtered {
            "[vout]".to_string()
        } else {
            format!("{}:{}", input, stream.index)
        })
    }

    fn audio_map(&self) -> Option<String> {
        let (input, stream) = self.audio?;
        Some(if self.audio_filtered {
            "[aout]".to_string()
        } else {
            format!("{}:{}", input, stream.index)
        })
    }
}

fn args<I, S>(items: I) -> Contribution
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Contribution::Args(items.into_iter().map(Into::into).collect())
}

/// `[flag, value]`, or nothing when the value is absent.
fn option_arg(flag: &str, value: Option<String>) -> Contribution {
    match value {
        Some(value) => Contribution::Args(vec![flag.to_string(), value]),
        None => Contribution::Args(Vec::new()),
    }
}

/// Seconds with millisecond precision.
fn seconds(value: f64) -> String {
    format!("{:.3}", value)
}

impl PipelineStep {
    /// Stable identifier, e.g. `global:loglevel` or `filter:scale`.
    pub fn id(&self) -> String {
        match self {
            PipelineStep::Global(option) => format!("global:{}", option.name()),
            PipelineStep::Input { input, option } => format!("input{}:{}", input, option.name()),
            PipelineStep::Output(option) => format!("output:{}", option.name()),
            PipelineStep::VideoFilter(filter) => format!("filter:{}", filter.id()),
            PipelineStep::AudioFilter(filter) => format!("afilter:{}", filter.id()),
            PipelineStep::Environment(variable) => format!("env:{}", variable.name()),
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            PipelineStep::Global(_) => StepKind::Global,
            PipelineStep::Input { .. } => StepKind::Input,
            PipelineStep::Output(_) => StepKind::Output,
            PipelineStep::VideoFilter(_) | PipelineStep::AudioFilter(_) => StepKind::Filter,
            PipelineStep::Environment(_) => StepKind::Environment,
        }
    }

    /// Only video filters change the frame state.
    pub fn affects_state(&self) -> bool {
        matches!(self, PipelineStep::VideoFilter(_))
    }

    pub fn is_applicable(&self, ctx: &StepContext<'_>) -> bool {
        let request = ctx.request;
        match self {
            PipelineStep::Global(option) => match option {
                GlobalOption::HideBanner
                | GlobalOption::NoStats
                | GlobalOption::NoStdin
                | GlobalOption::LogLevel => true,
                GlobalOption::Threads => request.threads.is_some(),
                GlobalOption::HardwareDevice => {
                    ctx.uses_hardware() && !ctx.profile.device_init_args().is_empty()
                }
            },
            PipelineStep::Input { input, option } => match option {
                InputOption::Realtime => request.input.realtime,
                InputOption::Seek => request.input.start.is_some(),
                InputOption::Duration => request.input.duration.is_some(),
                InputOption::HardwareDecode => {
                    ctx.video.map(|(index, _)| index) == Some(*input)
                        && ctx.decoder.map_or(false, Decoder::is_hardware)
                }
                InputOption::Source => *input < ctx.inputs.len(),
            },
            PipelineStep::Output(option) => match option {
                OutputOption::MapVideo | OutputOption::VideoCodec => {
                    ctx.video.is_some() && ctx.encoder.is_some()
                }
                OutputOption::FrameRate => {
                    matches!(ctx.encoder, Some(encoder) if *encoder != Encoder::Copy)
                        && request.video.as_ref().map_or(false, |v| v.frame_rate.is_some())
                }
                OutputOption::NoVideo => ctx.encoder.is_none(),
                OutputOption::MapAudio | OutputOption::AudioCodec => {
                    ctx.audio.is_some() && request.audio.is_some()
                }
                OutputOption::NoAudio => ctx.audio.is_none() || request.audio.is_none(),
                OutputOption::Muxer | OutputOption::Target => true,
                OutputOption::MuxerFlags => request.container == ContainerFormat::Mp4,
            },
            PipelineStep::VideoFilter(filter) => {
                let (Some(state), Some(target)) = (ctx.state, ctx.target) else {
                    return false;
                };
                match filter {
                    VideoFilter::HardwareUpload { .. } => {
                        reconcile::need_hardware_upload(state, target.location)
                    }
                    VideoFilter::HardwareDownload => {
                        reconcile::need_hardware_download(state, target.location)
                    }
                    VideoFilter::Deinterlace => reconcile::need_deinterlace(state, target),
                    VideoFilter::Scale { .. } => reconcile::need_scale(state, target),
                    VideoFilter::Pad { .. } => reconcile::need_pad(state, target),
                    VideoFilter::FormatConversion { .. } => {
                        reconcile::need_format_conversion(state, target)
                    }
                    VideoFilter::Conform { .. } => !reconcile::satisfies(state, target),
                }
            }
            PipelineStep::AudioFilter(filter) => {
                let Some(spec) = request.audio.as_ref() else {
                    return false;
                };
                if ctx.audio.is_none() || ctx.audio_copy {
                    return false;
                }
                match filter {
                    AudioFilter::Resample => true,
                    AudioFilter::Loudnorm => spec.normalize_loudness,
                    AudioFilter::PadSilence { .. } => {
                        spec.pad_silence && request.input.duration.is_some()
                    }
                }
            }
            PipelineStep::Environment(EnvironmentVariable::VaapiDriver) => {
                ctx.uses_hardware() && !ctx.profile.environment().is_empty()
            }
        }
    }

    /// Contribution of the step. Video filters render against the running
    /// state and also yield the state they produce.
    pub fn contribution(
        &self,
        ctx: &StepContext<'_>,
    ) -> Result<(Contribution, Option<FrameState>)> {
        let request = ctx.request;
        let contribution = match self {
            PipelineStep::Global(option) => match option {
                GlobalOption::HideBanner => args(["-hide_banner"]),
                GlobalOption::NoStats => args(["-nostats"]),
                GlobalOption::NoStdin => args(["-nostdin"]),
                GlobalOption::LogLevel => option_arg("-loglevel", Some(request.log_level.clone())),
                GlobalOption::Threads => {
                    option_arg("-threads", request.threads.map(|n| n.to_string()))
                }
                GlobalOption::HardwareDevice => Contribution::Args(ctx.profile.device_init_args()),
            },
            PipelineStep::Input { input, option } => match option {
                InputOption::Realtime => args(["-re"]),
                InputOption::Seek => option_arg("-ss", request.input.start.map(seconds)),
                InputOption::Duration => option_arg("-t", request.input.duration.map(seconds)),
                InputOption::HardwareDecode => match (ctx.decoder, ctx.video) {
                    (Some(decoder), Some((_, stream))) => {
                        Contribution::Args(decoder.input_args(&stream.codec))
                    }
                    _ => Contribution::Args(Vec::new()),
                },
                InputOption::Source => {
                    option_arg("-i", ctx.inputs.get(*input).map(|source| source.path.clone()))
                }
            },
            PipelineStep::Output(option) => output_contribution(*option, ctx),
            PipelineStep::VideoFilter(filter) => {
                let state = ctx.state.ok_or_else(|| {
                    PipelineError::transition(filter.id(), "no frame state to transform")
                })?;
                let (fragment, next) = filter.apply(state)?;
                next.validate()
                    .map_err(|e| PipelineError::transition(filter.id(), e.to_string()))?;
                return Ok((Contribution::Fragment(fragment), Some(next)));
            }
            PipelineStep::AudioFilter(filter) => Contribution::Fragment(filter.fragment()),
            PipelineStep::Environment(EnvironmentVariable::VaapiDriver) => {
                Contribution::Environment(ctx.profile.environment())
            }
        };
        Ok((contribution, None))
    }
}

fn output_contribution(option: OutputOption, ctx: &StepContext<'_>) -> Contribution {
    let request = ctx.request;
    match option {
        OutputOption::MapVideo => option_arg("-map", ctx.video_map()),
        OutputOption::VideoCodec => match (ctx.encoder, request.video.as_ref()) {
            (Some(encoder), Some(spec)) => {
                Contribution::Args(encoder.output_args(&spec.encoder_settings()))
            }
            _ => Contribution::Args(Vec::new()),
        },
        OutputOption::FrameRate => option_arg(
            "-r",
            request
                .video
                .as_ref()
                .and_then(|v| v.frame_rate)
                .map(|rate| rate.to_string()),
        ),
        OutputOption::NoVideo => args(["-vn"]),
        OutputOption::MapAudio => option_arg("-map", ctx.audio_map()),
        OutputOption::AudioCodec => match request.audio.as_ref() {
            Some(_) if ctx.audio_copy => args(["-c:a", "copy"]),
            Some(spec) => {
                let mut tokens = vec!["-c:a".to_string(), spec.codec.encoder_name().to_string()];
                if let Some(kbps) = spec.bitrate_kbps {
                    tokens.extend(["-b:a".to_string(), format!("{}k", kbps)]);
                }
                if let Some(channels) = spec.channels {
                    tokens.extend(["-ac".to_string(), channels.to_string()]);
                }
                if let Some(rate) = spec.sample_rate {
                    tokens.extend(["-ar".to_string(), rate.to_string()]);
                }
                Contribution::Args(tokens)
            }
            None => Contribution::Args(Vec::new()),
        },
        OutputOption::NoAudio => args(["-an"]),
        OutputOption::Muxer => args(["-f", request.container.muxer_name()]),
        OutputOption::MuxerFlags => args(["-movflags", "+frag_keyframe+empty_moov"]),
        OutputOption::Target => args([request.target.clone()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{AudioOutputSpec, InputSettings, VideoOutputSpec};
    use channelcast_core::{AudioCodec, FrameSize, VideoCodec};

    fn tokens(contribution: Contribution) -> Vec<String> {
        match contribution {
            Contribution::Args(args) => args,
            other => panic!("expected args, got {:?}", other),
        }
    }

    #[test]
    fn test_ids_and_kinds() {
        let step = PipelineStep::Input {
            input: 1,
            option: InputOption::Seek,
        };
        assert_eq!(step.id(), "input1:seek");
        assert_eq!(step.kind(), StepKind::Input);
        assert!(!step.affects_state());

        let filter = PipelineStep::VideoFilter(VideoFilter::Deinterlace);
        assert_eq!(filter.id(), "filter:deinterlace");
        assert_eq!(filter.kind(), StepKind::Filter);
        assert!(filter.affects_state());
        assert!(!PipelineStep::AudioFilter(AudioFilter::Resample).affects_state());
    }

    #[test]
    fn test_global_options() {
        let mut request = TranscodeRequest::default();
        let profile = CapabilityProfile::software();
        let ctx = StepContext::new(&request, &[], &profile);
        let threads = PipelineStep::Global(GlobalOption::Threads);
        assert!(!threads.is_applicable(&ctx));
        let (loglevel, _) = PipelineStep::Global(GlobalOption::LogLevel)
            .contribution(&ctx)
            .unwrap();
        assert_eq!(tokens(loglevel), vec!["-loglevel", "error"]);
        // software never initializes a device
        assert!(!PipelineStep::Global(GlobalOption::HardwareDevice).is_applicable(&ctx));

        request.threads = Some(4);
        let ctx = StepContext::new(&request, &[], &profile);
        assert!(threads.is_applicable(&ctx));
        assert_eq!(tokens(threads.contribution(&ctx).unwrap().0), vec!["-threads", "4"]);
    }

    #[test]
    fn test_input_options() {
        let request = TranscodeRequest::default().with_input(InputSettings {
            realtime: true,
            start: Some(90.5),
            duration: None,
        });
        let inputs = vec![MediaInput::new("/media/show.mkv")];
        let profile = CapabilityProfile::software();
        let ctx = StepContext::new(&request, &inputs, &profile);

        let seek = PipelineStep::Input {
            input: 0,
            option: InputOption::Seek,
        };
        assert!(seek.is_applicable(&ctx));
        assert_eq!(tokens(seek.contribution(&ctx).unwrap().0), vec!["-ss", "90.500"]);
        assert!(!PipelineStep::Input {
            input: 0,
            option: InputOption::Duration
        }
        .is_applicable(&ctx));

        let source = PipelineStep::Input {
            input: 0,
            option: InputOption::Source,
        };
        assert_eq!(
            tokens(source.contribution(&ctx).unwrap().0),
            vec!["-i", "/media/show.mkv"]
        );
        assert!(!PipelineStep::Input {
            input: 1,
            option: InputOption::Source
        }
        .is_applicable(&ctx));
    }

    #[test]
    fn test_audio_codec_args() {
        let request = TranscodeRequest::new(
            VideoOutputSpec::new(VideoCodec::H264),
            AudioOutputSpec::new(AudioCodec::Ac3),
        );
        let profile = CapabilityProfile::software();
        let ctx = StepContext::new(&request, &[], &profile);
        let (contribution, _) = PipelineStep::Output(OutputOption::AudioCodec)
            .contribution(&ctx)
            .unwrap();
        assert_eq!(
            tokens(contribution),
            vec!["-c:a", "ac3", "-b:a", "192k", "-ac", "2", "-ar", "48000"]
        );

        let copy = StepContext {
            audio_copy: true,
            ..ctx
        };
        let (contribution, _) = PipelineStep::Output(OutputOption::AudioCodec)
            .contribution(&copy)
            .unwrap();
        assert_eq!(tokens(contribution), vec!["-c:a", "copy"]);
    }

    #[test]
    fn test_video_filter_without_state_is_inapplicable() {
        let request = TranscodeRequest::default();
        let profile = CapabilityProfile::software();
        let ctx = StepContext::new(&request, &[], &profile);
        let scale = PipelineStep::VideoFilter(VideoFilter::Scale {
            size: FrameSize::new(1280, 720),
            format: None,
        });
        assert!(!scale.is_applicable(&ctx));
        let err = scale.contribution(&ctx).unwrap_err();
        assert!(matches!(err, PipelineError::TransitionFailed { .. }));
    }

    #[test]
    fn test_mp4_gets_fragmented_flags() {
        let request = TranscodeRequest::default().with_container(ContainerFormat::Mp4);
        let profile = CapabilityProfile::software();
        let ctx = StepContext::new(&request, &[], &profile);
        let flags = PipelineStep::Output(OutputOption::MuxerFlags);
        assert!(flags.is_applicable(&ctx));
        assert_eq!(
            tokens(flags.contribution(&ctx).unwrap().0),
            vec!["-movflags", "+frag_keyframe+empty_moov"]
        );
    }
}
