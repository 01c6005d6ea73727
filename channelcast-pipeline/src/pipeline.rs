//! Pipeline builder.
//!
//! [`PipelineBuilder::build`] is the single entry point: it resolves the
//! effective backend, selects decoder and encoder, folds the frame state
//! through the filter steps and assembles the final argument list. It is a
//! pure function of its inputs; the only shared value is the capability
//! snapshot, which is read-only.

use std::borrow::Cow;
use std::sync::Arc;

use channelcast_core::{
    AudioStream, Error as CoreError, FrameDataLocation, FrameState, SoftwareFormat, VideoStream,
};
use channelcast_hwaccel::{
    resolve_encoder_backend, CapabilityCache, CapabilityProfile, CapabilitySnapshot, Decoder,
    Encoder, FallbackReason, HwAccelMode,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::filter::{AudioFilter, FilterChain, VideoFilter};
use crate::reconcile::{self, TargetState};
use crate::request::{MediaInput, TranscodeRequest, VideoOutputSpec};
use crate::step::{
    Contribution, EnvironmentVariable, GlobalOption, InputOption, OutputOption, PipelineStep,
    StepContext,
};
use crate::{PipelineError, Result};

const GLOBAL_OPTIONS: [GlobalOption; 6] = [
    GlobalOption::HideBanner,
    GlobalOption::NoStats,
    GlobalOption::NoStdin,
    GlobalOption::LogLevel,
    GlobalOption::Threads,
    GlobalOption::HardwareDevice,
];

const INPUT_OPTIONS: [InputOption; 5] = [
    InputOption::Realtime,
    InputOption::Seek,
    InputOption::Duration,
    InputOption::HardwareDecode,
    InputOption::Source,
];

const OUTPUT_OPTIONS: [OutputOption; 10] = [
    OutputOption::MapVideo,
    OutputOption::VideoCodec,
    OutputOption::FrameRate,
    OutputOption::NoVideo,
    OutputOption::MapAudio,
    OutputOption::AudioCodec,
    OutputOption::NoAudio,
    OutputOption::Muxer,
    OutputOption::MuxerFlags,
    OutputOption::Target,
];

/// Filter work in the order it runs. Transfers are inserted around it.
#[derive(Debug, Clone, Copy)]
enum Work {
    Deinterlace,
    Scale,
    Pad,
    Format,
}

const WORK_ORDER: [Work; 4] = [Work::Deinterlace, Work::Scale, Work::Pad, Work::Format];

/// One entry of the frame-state audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    /// Identifier of the step that produced `state`.
    pub step: String,
    pub fragment: Option<String>,
    pub state: FrameState,
}

/// Result of a build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscodePlan {
    /// Transcoder arguments, without the program name.
    pub args: Vec<String>,
    pub environment: Vec<(String, String)>,
    pub requested_mode: HwAccelMode,
    pub effective_mode: HwAccelMode,
    pub fallback: Option<FallbackReason>,
    pub decoder: Option<Decoder>,
    pub encoder: Option<Encoder>,
    /// State the encoder receives; `None` without video encoding.
    pub target: Option<TargetState>,
    pub history: Vec<StateTransition>,
    /// Identifiers of every applied step, in order.
    pub steps: Vec<String>,
    pub video_filter: Option<String>,
    pub audio_filter: Option<String>,
    /// Value of `-filter_complex`, if any.
    pub filter_complex: Option<String>,
}

impl TranscodePlan {
    /// The build runs on a different backend than requested.
    pub fn fell_back(&self) -> bool {
        self.fallback.is_some()
    }

    /// The last frame state of the audit trail.
    pub fn final_state(&self) -> Option<&FrameState> {
        self.history.last().map(|t| &t.state)
    }

    /// Shell-quoted command line, environment first.
    pub fn command_line(&self) -> String {
        let mut parts: Vec<String> = self
            .environment
            .iter()
            .map(|(key, value)| format!("{}={}", key, shell_quote(value)))
            .collect();
        parts.push("ffmpeg".to_string());
        parts.extend(self.args.iter().map(|arg| shell_quote(arg).into_owned()));
        parts.join(" ")
    }
}

fn shell_quote(token: &str) -> Cow<'_, str> {
    let plain = |c: char| c.is_ascii_alphanumeric() || "-_=+/.,:@%".contains(c);
    if !token.is_empty() && token.chars().all(plain) {
        Cow::Borrowed(token)
    } else {
        Cow::Owned(format!("'{}'", token.replace('\'', r"'\''")))
    }
}

/// Accumulates arguments and environment from applicable steps.
#[derive(Default)]
struct Assembly {
    args: Vec<String>,
    environment: Vec<(String, String)>,
    steps: Vec<String>,
}

impl Assembly {
    fn emit(&mut self, step: PipelineStep, ctx: &StepContext<'_>) -> Result<()> {
        if !step.is_applicable(ctx) {
            return Ok(());
        }
        let (contribution, _) = step.contribution(ctx)?;
        match contribution {
            Contribution::Args(args) => self.args.extend(args),
            Contribution::Environment(vars) => self.environment.extend(vars),
            Contribution::Fragment(_) => {
                return Err(PipelineError::transition(
                    step.id(),
                    "filter fragments belong in the filter graph",
                ));
            }
        }
        self.steps.push(step.id());
        Ok(())
    }
}

/// Frame-state fold over the video filters.
#[derive(Default)]
struct VideoFold {
    chain: FilterChain,
    history: Vec<StateTransition>,
    steps: Vec<String>,
}

impl VideoFold {
    fn record(&mut self, step: impl Into<String>, state: &FrameState) {
        self.history.push(StateTransition {
            step: step.into(),
            fragment: None,
            state: state.clone(),
        });
    }

    /// Apply a video filter step and record its transition.
    fn apply(&mut self, step: PipelineStep, ctx: &StepContext<'_>) -> Result<FrameState> {
        let id = step.id();
        let (contribution, next) = step.contribution(ctx)?;
        let next = next
            .ok_or_else(|| PipelineError::transition(id.as_str(), "step produced no frame state"))?;
        let fragment = match contribution {
            Contribution::Fragment(fragment) => fragment,
            _ => return Err(PipelineError::transition(id, "filter produced no fragment")),
        };
        debug!(step = %id, fragment = %fragment, "Applied filter step");
        self.chain.add(fragment.as_str());
        self.history.push(StateTransition {
            step: id.clone(),
            fragment: Some(fragment),
            state: next.clone(),
        });
        self.steps.push(id);
        Ok(next)
    }

    /// Move frames to `required`. Layouts the backend cannot hold on its
    /// surfaces, unknown ones included, are converted before upload.
    fn transfer(
        &mut self,
        base: &StepContext<'_>,
        state: FrameState,
        required: FrameDataLocation,
        mode: HwAccelMode,
        target: &TargetState,
    ) -> Result<FrameState> {
        if reconcile::need_hardware_upload(&state, required) {
            let mut state = state;
            let uploadable = state
                .software_format()
                .is_some_and(|layout| base.profile.supports_format(layout));
            if !uploadable {
                let convert = VideoFilter::FormatConversion {
                    format: target.layout(),
                };
                state = self.apply(PipelineStep::VideoFilter(convert), &base.at(&state))?;
            }
            let upload = VideoFilter::HardwareUpload { mode };
            return self.apply(PipelineStep::VideoFilter(upload), &base.at(&state));
        }
        if reconcile::need_hardware_download(&state, required) {
            return self.apply(
                PipelineStep::VideoFilter(VideoFilter::HardwareDownload),
                &base.at(&state),
            );
        }
        Ok(state)
    }
}

/// Compiles transcode requests into transcoder arguments.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    snapshot: CapabilitySnapshot,
}

impl PipelineBuilder {
    /// Create a builder over a capability snapshot.
    pub fn new(snapshot: CapabilitySnapshot) -> Self {
        Self { snapshot }
    }

    /// Builder for the mode `request` asks for, or the configured mode.
    pub fn for_request(cache: &CapabilityCache, request: &TranscodeRequest) -> Self {
        let mode = request.hwaccel.unwrap_or(cache.settings().mode);
        Self::new(cache.snapshot(mode))
    }

    /// Software-only builder.
    pub fn software() -> Self {
        Self::new(CapabilitySnapshot::software())
    }

    pub fn snapshot(&self) -> &CapabilitySnapshot {
        &self.snapshot
    }

    /// Compile `request` over `inputs`.
    pub fn build(
        &self,
        inputs: &[MediaInput],
        request: &TranscodeRequest,
    ) -> Result<TranscodePlan> {
        if inputs.is_empty() {
            return Err(PipelineError::InvalidRequest("no inputs".into()));
        }
        check_container(request)?;

        let video = match request.video {
            Some(_) => {
                let selected = first_video(inputs).ok_or_else(|| {
                    PipelineError::InvalidRequest("no input carries a video stream".into())
                })?;
                check_descriptor(selected.1)?;
                Some(selected)
            }
            None => None,
        };
        let audio = request.audio.as_ref().and(first_audio(inputs));

        // passthrough never touches the hardware, so it cannot fall back
        let passthrough = matches!(
            (&request.video, video),
            (Some(spec), Some((_, stream))) if spec.matches_source(stream)
        );
        let (profile, fallback): (Arc<CapabilityProfile>, _) = match &request.video {
            Some(spec) if !passthrough => {
                let resolution = resolve_encoder_backend(&self.snapshot, &spec.codec);
                (resolution.profile, resolution.fallback)
            }
            _ => (Arc::clone(&self.snapshot.profile), self.snapshot.fallback.clone()),
        };
        info!(
            requested = %self.snapshot.requested,
            effective = %profile.mode,
            fallback = fallback.is_some(),
            "Resolved transcoding backend"
        );

        let (decoder, encoder) = match (&request.video, video) {
            (Some(_), Some(_)) if passthrough => (Some(Decoder::Copy), Some(Encoder::Copy)),
            (Some(spec), Some((_, stream))) => (
                Some(Decoder::select(stream, &profile)),
                Some(Encoder::select(&spec.codec, &profile)),
            ),
            _ => (None, None),
        };
        let audio_copy = match (&request.audio, audio) {
            (Some(spec), Some((_, stream))) => spec.matches_source(stream),
            _ => false,
        };

        let mut base = StepContext::new(request, inputs, &profile);
        base.video = video;
        base.audio = audio;
        base.decoder = decoder.as_ref();
        base.encoder = encoder.as_ref();
        base.audio_copy = audio_copy;

        let mut fold = VideoFold::default();
        let mut target = None;
        if let (Some(spec), Some((_, stream)), Some(decoder), Some(encoder)) =
            (&request.video, video, &decoder, &encoder)
        {
            target = self.fold_video(&base, &mut fold, stream, spec, decoder, encoder)?;
        }

        let mut audio_chain = FilterChain::new();
        let duration = request.input.duration.unwrap_or_default();
        for filter in [
            AudioFilter::Resample,
            AudioFilter::Loudnorm,
            AudioFilter::PadSilence { duration },
        ] {
            let step = PipelineStep::AudioFilter(filter);
            if !step.is_applicable(&base) {
                continue;
            }
            if let (Contribution::Fragment(fragment), _) = step.contribution(&base)? {
                debug!(step = %step.id(), fragment = %fragment, "Applied audio filter");
                audio_chain.add(fragment);
                fold.steps.push(step.id());
            }
        }

        base.video_filtered = !fold.chain.is_empty();
        base.audio_filtered = !audio_chain.is_empty();
        let filter_complex = filter_complex(video, &fold.chain, audio, &audio_chain);

        let mut assembly = Assembly::default();
        assembly.emit(PipelineStep::Environment(EnvironmentVariable::VaapiDriver), &base)?;
        for option in GLOBAL_OPTIONS {
            assembly.emit(PipelineStep::Global(option), &base)?;
        }
        for input in 0..inputs.len() {
            for option in INPUT_OPTIONS {
                assembly.emit(PipelineStep::Input { input, option }, &base)?;
            }
        }
        if let Some(graph) = &filter_complex {
            assembly.args.extend(["-filter_complex".to_string(), graph.clone()]);
            assembly.steps.extend(fold.steps.iter().cloned());
        }
        for option in OUTPUT_OPTIONS {
            assembly.emit(PipelineStep::Output(option), &base)?;
        }

        Ok(TranscodePlan {
            args: assembly.args,
            environment: assembly.environment,
            requested_mode: self.snapshot.requested,
            effective_mode: profile.mode,
            fallback,
            decoder,
            encoder,
            target,
            history: fold.history,
            steps: assembly.steps,
            video_filter: fold.chain.text(),
            audio_filter: audio_chain.text(),
            filter_complex,
        })
    }

    /// Fold the decoded frame state through the video filters until it is
    /// exactly what the encoder accepts.
    fn fold_video(
        &self,
        ctx: &StepContext<'_>,
        fold: &mut VideoFold,
        stream: &VideoStream,
        spec: &VideoOutputSpec,
        decoder: &Decoder,
        encoder: &Encoder,
    ) -> Result<Option<TargetState>> {
        let initial = FrameState::from_stream(stream, ctx.request.input.realtime);
        fold.record("input", &initial);
        let layout = spec
            .pixel_format
            .or(stream.pixel_format)
            .unwrap_or(SoftwareFormat::Yuv420p);
        let Some(required) = encoder.required_input(layout) else {
            return Ok(None);
        };

        let mut state = decoder.output_state(&initial)?;
        fold.record("decode", &state);

        let (scaled, padded) = match spec.frame_size {
            Some(canvas) => (stream.fitted_size(canvas), canvas),
            None => (stream.frame_size, stream.frame_size),
        };
        let target = TargetState::new(scaled, padded, required).with_deinterlace(spec.deinterlace);
        let mode = ctx.profile.mode;
        let base = StepContext {
            target: Some(&target),
            ..*ctx
        };

        for work in WORK_ORDER {
            let probe = work_filter(work, &state, &target, mode);
            if !PipelineStep::VideoFilter(probe.clone()).is_applicable(&base.at(&state)) {
                continue;
            }
            if let Some(location) = probe.required_location(mode) {
                state = fold.transfer(&base, state, location, mode, &target)?;
            }
            let filter = work_filter(work, &state, &target, mode);
            state = fold.apply(PipelineStep::VideoFilter(filter), &base.at(&state))?;
        }
        state = fold.transfer(&base, state, target.location, mode, &target)?;

        let conform = PipelineStep::VideoFilter(VideoFilter::Conform { mode, target });
        if conform.is_applicable(&base.at(&state)) {
            let previous = fold
                .history
                .last()
                .map_or_else(|| "decode".to_string(), |t| t.step.clone());
            let second = conform.id();
            state = fold
                .apply(conform, &base.at(&state))
                .map_err(|err| match err {
                    PipelineError::TransitionFailed { reason, .. } => {
                        PipelineError::StateTransitionConflict {
                            first: previous.clone(),
                            second: second.clone(),
                            reason,
                        }
                    }
                    other => other,
                })?;
            if let Some(reason) = reconcile::mismatch(&state, &target) {
                return Err(PipelineError::StateTransitionConflict {
                    first: previous,
                    second,
                    reason,
                });
            }
        }
        Ok(Some(target))
    }
}

/// Concrete filter for `work` given the current state.
fn work_filter(
    work: Work,
    state: &FrameState,
    target: &TargetState,
    mode: HwAccelMode,
) -> VideoFilter {
    match work {
        Work::Deinterlace => VideoFilter::Deinterlace,
        Work::Scale => {
            // a device scale converts the layout in the same pass when nothing
            // else runs between it and the encoder
            let fold_format = mode.filters_on_device()
                && state.location.is_hardware()
                && target.location.is_hardware()
                && target.padded_size == target.scaled_size
                && reconcile::need_format_conversion(state, target);
            VideoFilter::Scale {
                size: target.scaled_size,
                format: fold_format.then(|| target.layout()),
            }
        }
        Work::Pad => VideoFilter::Pad {
            size: target.padded_size,
        },
        Work::Format => VideoFilter::FormatConversion {
            format: target.layout(),
        },
    }
}

fn check_container(request: &TranscodeRequest) -> Result<()> {
    let container = request.container;
    if let Some(video) = &request.video {
        if !container.supports_video(&video.codec) {
            return Err(PipelineError::UnsupportedCombination {
                codec: video.codec.to_string(),
                container: container.to_string(),
            });
        }
    }
    if let Some(audio) = &request.audio {
        if !container.supports_audio(&audio.codec) {
            return Err(PipelineError::UnsupportedCombination {
                codec: audio.codec.to_string(),
                container: container.to_string(),
            });
        }
    }
    Ok(())
}

fn check_descriptor(stream: &VideoStream) -> Result<()> {
    if stream.frame_size.width == 0 {
        return Err(CoreError::missing(stream.index, "width").into());
    }
    if stream.frame_size.height == 0 {
        return Err(CoreError::missing(stream.index, "height").into());
    }
    Ok(())
}

fn first_video(inputs: &[MediaInput]) -> Option<(usize, &VideoStream)> {
    inputs
        .iter()
        .enumerate()
        .find_map(|(i, input)| input.video.as_ref().map(|stream| (i, stream)))
}

fn first_audio(inputs: &[MediaInput]) -> Option<(usize, &AudioStream)> {
    inputs
        .iter()
        .enumerate()
        .find_map(|(i, input)| input.audio.as_ref().map(|stream| (i, stream)))
}

fn filter_complex(
    video: Option<(usize, &VideoStream)>,
    video_chain: &FilterChain,
    audio: Option<(usize, &AudioStream)>,
    audio_chain: &FilterChain,
) -> Option<String> {
    let chains: Vec<String> = [
        video.and_then(|(i, s)| video_chain.labeled(&format!("{}:{}", i, s.index), "vout")),
        audio.and_then(|(i, s)| audio_chain.labeled(&format!("{}:{}", i, s.index), "aout")),
    ]
    .into_iter()
    .flatten()
    .collect();
    (!chains.is_empty()).then(|| chains.join(";"))
}
