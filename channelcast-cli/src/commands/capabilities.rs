//! Hardware capability inspection command.

use channelcast_hwaccel::{CapabilityCache, CapabilitySnapshot, HwAccelMode};
use clap::Args;
use console::style;
use serde::Serialize;

/// What one requested backend resolves to.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityReport {
    pub requested: HwAccelMode,
    pub effective: HwAccelMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    pub decoders: Vec<String>,
    pub encoders: Vec<String>,
    pub pixel_formats: Vec<String>,
    /// Global options that open the device.
    pub device_args: Vec<String>,
    pub environment: Vec<(String, String)>,
}

impl CapabilityReport {
    pub fn from_snapshot(snapshot: &CapabilitySnapshot) -> Self {
        let profile = &snapshot.profile;
        Self {
            requested: snapshot.requested,
            effective: profile.mode,
            fallback: snapshot.fallback.as_ref().map(ToString::to_string),
            decoders: profile
                .decoders
                .iter()
                .map(|(codec, name)| format!("{} ({})", codec, name))
                .collect(),
            encoders: profile.encoders.values().cloned().collect(),
            pixel_formats: profile
                .pixel_formats
                .iter()
                .map(|format| format.name().to_string())
                .collect(),
            device_args: profile.device_init_args(),
            environment: profile.environment(),
        }
    }
}

/// Probe acceleration backends and print what each offers.
#[derive(Args, Debug)]
pub struct CmdCapabilities {
    /// Probe every backend instead of the configured one
    #[arg(long)]
    pub all: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

impl CmdCapabilities {
    pub fn run(&self, cache: &CapabilityCache, hwaccel: Option<HwAccelMode>) -> anyhow::Result<()> {
        let modes = if self.all {
            HwAccelMode::ALL.to_vec()
        } else {
            vec![hwaccel.unwrap_or(cache.settings().mode)]
        };
        let reports: Vec<_> = modes
            .into_iter()
            .map(|mode| CapabilityReport::from_snapshot(&cache.snapshot(mode)))
            .collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        } else {
            for report in &reports {
                print_report(report);
            }
        }
        Ok(())
    }
}

fn print_report(report: &CapabilityReport) {
    println!();
    match &report.fallback {
        Some(reason) => println!(
            "{} {} {}",
            style(report.requested.name()).cyan().bold(),
            style("[FALLBACK]").yellow(),
            style(reason).dim()
        ),
        None => println!(
            "{} {}",
            style(report.requested.name()).cyan().bold(),
            style("[OK]").green()
        ),
    }
    println!("  Effective: {}", style(report.effective.name()).white());
    println!("  Encoders:  {}", report.encoders.join(", "));
    if !report.decoders.is_empty() {
        println!("  Decoders:  {}", report.decoders.join(", "));
    }
    if !report.pixel_formats.is_empty() {
        println!("  Formats:   {}", report.pixel_formats.join(", "));
    }
    if !report.device_args.is_empty() {
        println!("  Device:    {}", report.device_args.join(" "));
    }
    for (key, value) in &report.environment {
        println!("  Env:       {}={}", key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channelcast_hwaccel::CapabilityProfile;

    #[test]
    fn test_report_for_cuda() {
        let snapshot = CapabilitySnapshot::from_profile(CapabilityProfile::cuda(0));
        let report = CapabilityReport::from_snapshot(&snapshot);
        assert_eq!(report.effective, HwAccelMode::Cuda);
        assert!(report.fallback.is_none());
        assert!(report.encoders.contains(&"h264_nvenc".to_string()));
        assert_eq!(
            report.device_args,
            vec!["-init_hw_device", "cuda=cu:0", "-filter_hw_device", "cu"]
        );
    }

    #[test]
    fn test_report_json_omits_missing_fallback() {
        let report = CapabilityReport::from_snapshot(&CapabilitySnapshot::software());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["effective"], "none");
        assert!(json.get("fallback").is_none());
        assert_eq!(json["encoders"][0], "libx264");
    }
}
