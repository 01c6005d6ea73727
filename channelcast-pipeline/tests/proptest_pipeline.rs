//! Property-based checks over randomly generated sources and backends.

use channelcast_core::{
    FrameDataLocation, FrameSize, Rational, ScanType, SoftwareFormat, VideoCodec, VideoStream,
};
use channelcast_hwaccel::{CapabilityProfile, CapabilitySnapshot, HwAccelMode};
use channelcast_pipeline::reconcile;
use channelcast_pipeline::{
    FilterGraph, MediaInput, PipelineBuilder, TranscodePlan, TranscodeRequest, VideoOutputSpec,
};
use proptest::prelude::*;

const DEINTERLACERS: [&str; 4] = ["yadif", "yadif_cuda", "deinterlace_vaapi", "deinterlace_qsv"];
const SCALERS: [&str; 4] = ["scale", "scale_cuda", "scale_vaapi", "scale_qsv"];

fn even_dimension(max: u32) -> impl Strategy<Value = u32> {
    (32u32..=max / 2).prop_map(|half| half * 2)
}

fn layout() -> impl Strategy<Value = Option<SoftwareFormat>> {
    prop_oneof![
        Just(None),
        Just(Some(SoftwareFormat::Yuv420p)),
        Just(Some(SoftwareFormat::Nv12)),
        Just(Some(SoftwareFormat::Yuv420p10le)),
        Just(Some(SoftwareFormat::Yuv422p)),
    ]
}

fn profile() -> impl Strategy<Value = CapabilityProfile> {
    prop_oneof![
        Just(CapabilityProfile::software()),
        Just(CapabilityProfile::vaapi("/dev/dri/renderD128", None)),
        Just(CapabilityProfile::qsv("/dev/dri/renderD128", None)),
        Just(CapabilityProfile::cuda(0)),
        Just(CapabilityProfile::videotoolbox()),
    ]
}

fn source() -> impl Strategy<Value = VideoStream> {
    (
        prop_oneof![Just(VideoCodec::H264), Just(VideoCodec::Hevc), Just(VideoCodec::Mpeg2)],
        even_dimension(3840),
        even_dimension(2160),
        layout(),
        any::<bool>(),
        prop_oneof![Just((1u32, 1u32)), Just((4, 3)), Just((32, 27))],
    )
        .prop_map(|(codec, width, height, format, interlaced, (num, den))| {
            let mut stream = VideoStream::new(0, codec, FrameSize::new(width, height));
            if let Some(format) = format {
                stream = stream.with_pixel_format(format);
            }
            if interlaced {
                stream = stream.with_scan_type(ScanType::Interlaced);
            }
            if let Some(sar) = Rational::new(num, den) {
                stream = stream.with_sample_aspect_ratio(sar);
            }
            stream
        })
}

fn request() -> impl Strategy<Value = TranscodeRequest> {
    (
        prop_oneof![Just(VideoCodec::H264), Just(VideoCodec::Hevc)],
        proptest::option::of((even_dimension(1920), even_dimension(1080))),
    )
        .prop_map(|(codec, canvas)| {
            let mut spec = VideoOutputSpec::new(codec);
            if let Some((width, height)) = canvas {
                spec = spec.with_frame_size(width, height);
            }
            TranscodeRequest::video_only(spec)
        })
}

fn compile(
    profile: CapabilityProfile,
    stream: VideoStream,
    request: &TranscodeRequest,
) -> TranscodePlan {
    let inputs = [MediaInput::new("/media/input.mkv").with_video(stream)];
    PipelineBuilder::new(CapabilitySnapshot::from_profile(profile))
        .build(&inputs, request)
        .unwrap()
}

fn first_of(graph: &FilterGraph, names: &[&str]) -> Option<usize> {
    names.iter().filter_map(|name| graph.position(name)).min()
}

proptest! {
    #[test]
    fn builds_are_deterministic(profile in profile(), stream in source(), request in request()) {
        let first = compile(profile.clone(), stream.clone(), &request);
        let second = compile(profile, stream, &request);
        prop_assert_eq!(first.args, second.args);
        prop_assert_eq!(first.history, second.history);
    }

    #[test]
    fn encoder_receives_its_target(
        profile in profile(),
        stream in source(),
        request in request(),
    ) {
        let plan = compile(profile.clone(), stream, &request);
        let target = plan.target.unwrap();
        let last = plan.final_state().unwrap();
        prop_assert!(
            reconcile::satisfies(last, &target),
            "{:?}",
            reconcile::mismatch(last, &target)
        );
        for transition in &plan.history {
            let state = &transition.state;
            prop_assert!(state.validate().is_ok());
            if state.location == FrameDataLocation::Hardware {
                let layout = state.software_format();
                prop_assert!(
                    layout.is_some_and(|layout| profile.supports_format(layout)),
                    "{} left {:?} on the device",
                    transition.step,
                    layout
                );
            }
        }
    }

    #[test]
    fn deinterlace_precedes_scaling(
        profile in profile(),
        stream in source(),
        request in request(),
    ) {
        let plan = compile(profile, stream, &request);
        let graph = FilterGraph::parse(plan.filter_complex.as_deref().unwrap_or(""));
        if let (Some(deinterlace), Some(scale)) =
            (first_of(&graph, &DEINTERLACERS), first_of(&graph, &SCALERS))
        {
            prop_assert!(deinterlace < scale);
        }
    }

    #[test]
    fn software_builds_stay_in_system_memory(stream in source(), request in request()) {
        let plan = compile(CapabilityProfile::software(), stream, &request);
        prop_assert_eq!(plan.effective_mode, HwAccelMode::None);
        for transition in &plan.history {
            prop_assert_eq!(transition.state.location, FrameDataLocation::Software);
        }
        prop_assert!(!plan.args.iter().any(|arg| arg.starts_with("-hwaccel")));
        prop_assert!(!plan.args.iter().any(|arg| arg.contains("hwupload")));
    }

    #[test]
    fn unchanged_source_has_no_filters(
        width in even_dimension(1920),
        height in even_dimension(1080),
    ) {
        let stream = VideoStream::new(0, VideoCodec::H264, FrameSize::new(width, height))
            .with_pixel_format(SoftwareFormat::Yuv420p);
        let request = TranscodeRequest::video_only(
            VideoOutputSpec::new(VideoCodec::H264).with_frame_size(width, height),
        );
        let plan = compile(CapabilityProfile::software(), stream, &request);
        prop_assert_eq!(plan.filter_complex, None);
        prop_assert_eq!(plan.history.len(), 2);
    }
}
