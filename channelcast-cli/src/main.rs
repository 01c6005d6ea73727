//! channelcast CLI - compile live-channel transcodes into ffmpeg commands.

mod commands;

use channelcast_hwaccel::{CapabilityCache, HardwareSettings, HwAccelMode, SystemProber};
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;

use commands::{read_json, CmdBuild, CmdCapabilities};

/// Command-line arguments for the channelcast tool.
#[derive(Parser, Debug)]
#[command(name = "channelcast")]
#[command(version)]
#[command(about = "Compile transcode requests into ffmpeg invocations")]
#[command(long_about = "channelcast turns probed input streams and an output request into the \
    exact ffmpeg argument list, offloading to VA-API, Quick Sync, NVENC or VideoToolbox \
    when the machine supports it.\n\n\
    EXAMPLES:\n    \
    channelcast build -i /media/movie.mkv -p movie.json\n    \
    channelcast build -i udp://239.0.0.1:1234 -p feed.json -r request.json --hwaccel vaapi\n    \
    channelcast capabilities --all")]
struct Cli {
    /// Verbose output (debug logging of every pipeline step)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Hardware settings file (JSON)
    #[arg(short, long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Acceleration backend (none, vaapi, qsv, cuda, videotoolbox)
    #[arg(long, global = true, env = "CHANNELCAST_HWACCEL", value_name = "MODE")]
    hwaccel: Option<HwAccelMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a transcode request into an ffmpeg command
    Build(CmdBuild),
    /// Probe acceleration backends and print their capabilities
    Capabilities(CmdCapabilities),
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install log subscriber: {}", err))
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let settings = match &cli.settings {
        Some(path) => read_json(path, "hardware settings")?,
        None => HardwareSettings::default(),
    };
    let cache = CapabilityCache::new(SystemProber, settings);

    match &cli.command {
        Commands::Build(cmd) => cmd.run(&cache, cli.hwaccel),
        Commands::Capabilities(cmd) => cmd.run(&cache, cli.hwaccel),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose).and_then(|()| run(&cli)) {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_arguments() {
        let cli = Cli::try_parse_from([
            "channelcast",
            "build",
            "-i",
            "/media/a.mkv",
            "-p",
            "a.json",
            "--hwaccel",
            "nvenc",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.hwaccel, Some(HwAccelMode::Cuda));
        let Commands::Build(cmd) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(cmd.inputs, vec!["/media/a.mkv"]);
        assert_eq!(cmd.probes, vec![PathBuf::from("a.json")]);
        assert!(cmd.json);
    }

    #[test]
    fn test_second_logging_init_is_reported() {
        let _ = init_logging(false);
        let err = init_logging(true).unwrap_err();
        assert!(err.to_string().contains("log subscriber"));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result = Cli::try_parse_from(["channelcast", "--hwaccel", "amf", "capabilities"]);
        assert!(result.is_err());
    }
}
