//! Request compilation command.

use anyhow::Context;
use channelcast_core::ProbeDocument;
use channelcast_hwaccel::{CapabilityCache, HwAccelMode};
use channelcast_pipeline::{MediaInput, PipelineBuilder, TranscodePlan, TranscodeRequest};
use clap::Args;
use console::style;
use std::path::PathBuf;
use tracing::debug;

use super::read_json;

/// Compile a transcode request into one ffmpeg invocation.
#[derive(Args, Debug)]
pub struct CmdBuild {
    /// Input URL or path, repeat for several inputs
    #[arg(short, long = "input", required = true, value_name = "URL")]
    pub inputs: Vec<String>,

    /// ffprobe JSON for each input, in the same order
    #[arg(short, long = "probe", required = true, value_name = "FILE")]
    pub probes: Vec<PathBuf>,

    /// Transcode request (JSON); defaults to H.264/AAC in MPEG-TS
    #[arg(short, long, value_name = "FILE")]
    pub request: Option<PathBuf>,

    /// Output target, overriding the request
    #[arg(short, long, value_name = "TARGET")]
    pub output: Option<String>,

    /// Print the whole plan as JSON
    #[arg(long)]
    pub json: bool,
}

impl CmdBuild {
    pub fn run(&self, cache: &CapabilityCache, hwaccel: Option<HwAccelMode>) -> anyhow::Result<()> {
        let mut request = match &self.request {
            Some(path) => read_json(path, "transcode request")?,
            None => TranscodeRequest::default(),
        };
        if let Some(target) = &self.output {
            request = request.with_target(target.clone());
        }
        if let Some(mode) = hwaccel {
            request = request.with_hwaccel(mode);
        }

        let inputs = self.load_inputs()?;
        let plan = PipelineBuilder::for_request(cache, &request)
            .build(&inputs, &request)
            .context("building transcode pipeline")?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print_summary(&plan);
            println!("{}", plan.command_line());
        }
        Ok(())
    }

    fn load_inputs(&self) -> anyhow::Result<Vec<MediaInput>> {
        if self.inputs.len() != self.probes.len() {
            anyhow::bail!(
                "{} inputs but {} probe documents; pass one --probe per --input",
                self.inputs.len(),
                self.probes.len()
            );
        }
        self.inputs
            .iter()
            .zip(&self.probes)
            .map(|(url, probe)| {
                let document: ProbeDocument = read_json(probe, "probe document")?;
                media_input(url, &document)
                    .with_context(|| format!("describing streams of {}", url))
            })
            .collect()
    }
}

/// Bind the first video and audio stream of `document` to `url`.
pub fn media_input(url: &str, document: &ProbeDocument) -> anyhow::Result<MediaInput> {
    let mut input = MediaInput::new(url);
    if let Some(video) = document.video_streams()?.into_iter().next() {
        debug!(url, index = video.index, codec = %video.codec, "Selected video stream");
        input = input.with_video(video);
    }
    if let Some(audio) = document.audio_streams()?.into_iter().next() {
        debug!(url, index = audio.index, codec = %audio.codec, "Selected audio stream");
        input = input.with_audio(audio);
    }
    Ok(input)
}

fn print_summary(plan: &TranscodePlan) {
    eprintln!(
        "{} {}",
        style("Backend:").cyan().bold(),
        style(plan.effective_mode.name()).white()
    );
    if let Some(reason) = &plan.fallback {
        eprintln!("{} {}", style("Fallback:").yellow().bold(), reason);
    }
    if let Some(filter) = &plan.video_filter {
        eprintln!("{} {}", style("Video filters:").cyan().bold(), filter);
    }
    if let Some(filter) = &plan.audio_filter {
        eprintln!("{} {}", style("Audio filters:").cyan().bold(), filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channelcast_core::VideoCodec;

    const PROBE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "mpeg2video",
             "width": 720, "height": 576, "pix_fmt": "yuv420p", "field_order": "tt",
             "sample_aspect_ratio": "64:45", "avg_frame_rate": "25/1"},
            {"index": 1, "codec_type": "audio", "codec_name": "mp2",
             "channels": 2, "sample_rate": "48000"},
            {"index": 2, "codec_type": "audio", "codec_name": "ac3",
             "channels": 6, "sample_rate": "48000"}
        ],
        "format": {"format_name": "mpegts", "duration": "3600.0"}
    }"#;

    #[test]
    fn test_media_input_takes_first_streams() {
        let document = ProbeDocument::from_json(PROBE).unwrap();
        let input = media_input("udp://239.0.0.1:1234", &document).unwrap();
        assert_eq!(input.path, "udp://239.0.0.1:1234");
        let video = input.video.unwrap();
        assert_eq!(video.codec, VideoCodec::Mpeg2);
        assert!(video.scan_type.is_interlaced());
        assert_eq!(input.audio.unwrap().index, 1);
    }

    #[test]
    fn test_probe_count_must_match() {
        let cmd = CmdBuild {
            inputs: vec!["a.ts".into(), "b.ts".into()],
            probes: vec![PathBuf::from("a.json")],
            request: None,
            output: None,
            json: false,
        };
        let err = cmd.load_inputs().unwrap_err();
        assert!(err.to_string().contains("2 inputs but 1 probe documents"));
    }

    #[test]
    fn test_default_request_builds_from_probe() {
        let document = ProbeDocument::from_json(PROBE).unwrap();
        let inputs = vec![media_input("/media/news.ts", &document).unwrap()];
        let plan = PipelineBuilder::software()
            .build(&inputs, &TranscodeRequest::default())
            .unwrap();
        let line = plan.command_line();
        assert!(line.starts_with("ffmpeg -hide_banner"));
        assert!(line.contains("yadif=1"));
        assert!(line.contains("-c:a aac"));
    }
}
