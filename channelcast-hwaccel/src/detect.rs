//! Hardware capability probing.
//!
//! [`SystemProber`] asks the machine what a backend can do by running the
//! vendor introspection tools (`nvidia-smi`, `vainfo`). Probing blocks, so the
//! result is memoized by [`CapabilityCache`]: one probe per backend for the
//! life of the cache, shared by every build that asks afterwards.

use channelcast_core::VideoCodec;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::process::Command;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::error::{HwAccelError, Result};
use crate::fallback::FallbackReason;
use crate::profile::CapabilityProfile;
use crate::types::HardwareSettings;
use crate::HwAccelMode;

/// Source of capability profiles.
pub trait CapabilityProber: Send + Sync {
    /// Build the profile for `mode`. Errors are recoverable: the cache turns
    /// them into a software fallback.
    fn probe(&self, mode: HwAccelMode, settings: &HardwareSettings) -> Result<CapabilityProfile>;
}

/// GPU identity reported by `nvidia-smi`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuInfo {
    pub name: String,
    pub compute_major: u32,
    pub compute_minor: u32,
}

/// Parse `nvidia-smi --query-gpu=name,compute_cap --format=csv,noheader`.
pub fn parse_nvidia_smi(output: &str) -> Result<GpuInfo> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| HwAccelError::probe(HwAccelMode::Cuda, "nvidia-smi listed no GPU"))?;
    let (name, cap) = line.rsplit_once(',').ok_or_else(|| {
        HwAccelError::probe(HwAccelMode::Cuda, format!("unexpected line '{}'", line))
    })?;
    let bad_cap = || {
        HwAccelError::probe(
            HwAccelMode::Cuda,
            format!("bad compute capability '{}'", cap.trim()),
        )
    };
    let (major, minor) = cap.trim().split_once('.').ok_or_else(bad_cap)?;
    Ok(GpuInfo {
        name: name.trim().to_string(),
        compute_major: major.parse().map_err(|_| bad_cap())?,
        compute_minor: minor.parse().map_err(|_| bad_cap())?,
    })
}

/// Codec support reported by `vainfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaapiCapabilities {
    pub decode: BTreeSet<VideoCodec>,
    pub encode: BTreeSet<VideoCodec>,
    /// A 10-bit decode profile is present.
    pub ten_bit: bool,
    /// Driver description line.
    pub driver: Option<String>,
}

impl VaapiCapabilities {
    /// What a current Intel iHD driver exposes.
    pub fn full() -> Self {
        Self {
            decode: [
                VideoCodec::H264,
                VideoCodec::Hevc,
                VideoCodec::Mpeg2,
                VideoCodec::Vc1,
                VideoCodec::Vp9,
                VideoCodec::Av1,
            ]
            .into_iter()
            .collect(),
            encode: [VideoCodec::H264, VideoCodec::Hevc, VideoCodec::Mpeg2]
                .into_iter()
                .collect(),
            ten_bit: true,
            driver: None,
        }
    }
}

fn va_profile_codec(profile: &str) -> Option<VideoCodec> {
    let rest = profile.strip_prefix("VAProfile")?;
    let codec = if rest.starts_with("H264") {
        VideoCodec::H264
    } else if rest.starts_with("HEVC") {
        VideoCodec::Hevc
    } else if rest.starts_with("MPEG2") {
        VideoCodec::Mpeg2
    } else if rest.starts_with("VC1") {
        VideoCodec::Vc1
    } else if rest.starts_with("VP9") {
        VideoCodec::Vp9
    } else if rest.starts_with("AV1") {
        VideoCodec::Av1
    } else {
        return None;
    };
    Some(codec)
}

/// Parse the profile/entrypoint table printed by `vainfo`.
pub fn parse_vainfo(output: &str) -> Result<VaapiCapabilities> {
    let mut caps = VaapiCapabilities::default();
    let mut saw_profile = false;

    for line in output.lines().map(str::trim) {
        if let Some(driver) = line.strip_prefix("vainfo: Driver version:") {
            caps.driver = Some(driver.trim().to_string());
            continue;
        }
        let Some((profile, entrypoint)) = line.split_once(':') else {
            continue;
        };
        let (profile, entrypoint) = (profile.trim(), entrypoint.trim());
        if !profile.starts_with("VAProfile") {
            continue;
        }
        saw_profile = true;
        let Some(codec) = va_profile_codec(profile) else {
            continue;
        };
        match entrypoint {
            "VAEntrypointVLD" => {
                if profile.contains("Main10") || profile.ends_with("Profile2") {
                    caps.ten_bit = true;
                }
                caps.decode.insert(codec);
            }
            "VAEntrypointEncSlice" | "VAEntrypointEncSliceLP" => {
                caps.encode.insert(codec);
            }
            _ => {}
        }
    }

    if !saw_profile {
        return Err(HwAccelError::probe(
            HwAccelMode::Vaapi,
            "vainfo reported no profiles",
        ));
    }
    Ok(caps)
}

/// Probes the running machine with the vendor tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProber;

impl SystemProber {
    fn run_tool(program: &str, args: &[&str], driver: Option<&str>) -> Result<String> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(driver) = driver {
            cmd.env("LIBVA_DRIVER_NAME", driver);
        }
        debug!(program, ?args, "Running capability probe");
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(HwAccelError::CommandFailed {
                command: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // older vainfo builds print the table on stderr
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            return Ok(String::from_utf8_lossy(&output.stderr).into_owned());
        }
        Ok(stdout)
    }

    fn probe_vainfo(device: &str, driver: Option<&str>) -> Result<VaapiCapabilities> {
        let output = Self::run_tool("vainfo", &["--display", "drm", "--device", device], driver)?;
        parse_vainfo(&output)
    }
}

impl CapabilityProber for SystemProber {
    fn probe(&self, mode: HwAccelMode, settings: &HardwareSettings) -> Result<CapabilityProfile> {
        let profile = match mode {
            HwAccelMode::None => return Ok(CapabilityProfile::software()),
            HwAccelMode::VideoToolbox => {
                if !cfg!(target_os = "macos") {
                    return Err(HwAccelError::NotSupported(mode.name().to_string()));
                }
                CapabilityProfile::videotoolbox()
            }
            HwAccelMode::Cuda => {
                let index = settings.cuda_device.to_string();
                let output = Self::run_tool(
                    "nvidia-smi",
                    &["--query-gpu=name,compute_cap", "--format=csv,noheader", "-i", &index],
                    None,
                )?;
                let gpu = parse_nvidia_smi(&output)?;
                debug!(
                    gpu = %gpu.name,
                    compute = %format!("{}.{}", gpu.compute_major, gpu.compute_minor),
                    "Found CUDA device"
                );
                CapabilityProfile::cuda_for_compute(
                    settings.cuda_device,
                    gpu.compute_major,
                    gpu.compute_minor,
                )
            }
            HwAccelMode::Vaapi => {
                let driver = settings.vaapi_driver.as_deref();
                let caps = Self::probe_vainfo(&settings.vaapi_device, driver)?;
                CapabilityProfile::vaapi_from(
                    &caps,
                    settings.vaapi_device.clone(),
                    settings.vaapi_driver.clone(),
                )
            }
            HwAccelMode::Qsv => {
                let device = settings.qsv_device();
                let caps = Self::probe_vainfo(device, settings.vaapi_driver.as_deref())?;
                CapabilityProfile::qsv_from(&caps, device, settings.vaapi_driver.clone())
            }
        };
        Ok(profile.restricted(settings))
    }
}

/// Effective capabilities for one requested mode.
#[derive(Debug, Clone)]
pub struct CapabilitySnapshot {
    /// Mode the settings asked for.
    pub requested: HwAccelMode,
    /// Profile in effect; the software profile after a failed probe.
    pub profile: Arc<CapabilityProfile>,
    /// Why the effective mode differs from the requested one.
    pub fallback: Option<FallbackReason>,
}

impl CapabilitySnapshot {
    /// Snapshot of an already-known profile.
    pub fn from_profile(profile: CapabilityProfile) -> Self {
        Self {
            requested: profile.mode,
            profile: Arc::new(profile),
            fallback: None,
        }
    }

    pub fn software() -> Self {
        Self::from_profile(CapabilityProfile::software())
    }

    pub fn effective_mode(&self) -> HwAccelMode {
        self.profile.mode
    }

    pub fn fell_back(&self) -> bool {
        self.fallback.is_some()
    }
}

type ProbeOutcome = (Arc<CapabilityProfile>, Option<FallbackReason>);

/// Per-process memo of capability probes.
///
/// Each backend gets its own once-initialized slot, so a slow probe of one
/// backend never holds up callers asking for another.
pub struct CapabilityCache {
    prober: Box<dyn CapabilityProber>,
    settings: HardwareSettings,
    slots: Mutex<BTreeMap<HwAccelMode, Arc<OnceLock<ProbeOutcome>>>>,
}

impl CapabilityCache {
    /// Create a cache that probes with `prober`.
    pub fn new(prober: impl CapabilityProber + 'static, settings: HardwareSettings) -> Self {
        Self {
            prober: Box::new(prober),
            settings,
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn settings(&self) -> &HardwareSettings {
        &self.settings
    }

    /// Snapshot for the mode the settings request.
    pub fn requested(&self) -> CapabilitySnapshot {
        self.snapshot(self.settings.mode)
    }

    /// Snapshot for `mode`, probing on first use.
    pub fn snapshot(&self, mode: HwAccelMode) -> CapabilitySnapshot {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(mode).or_default())
        };
        let (profile, fallback) = slot.get_or_init(|| self.run_probe(mode)).clone();
        CapabilitySnapshot {
            requested: mode,
            profile,
            fallback,
        }
    }

    /// Whether `mode` has been probed already.
    pub fn is_probed(&self, mode: HwAccelMode) -> bool {
        self.slots
            .lock()
            .get(&mode)
            .map(|slot| slot.get().is_some())
            .unwrap_or(false)
    }

    fn run_probe(&self, mode: HwAccelMode) -> ProbeOutcome {
        match self.prober.probe(mode, &self.settings) {
            Ok(profile) => {
                info!(
                    backend = %mode,
                    decoders = profile.decoders.len(),
                    encoders = profile.encoders.len(),
                    "Hardware capabilities probed"
                );
                (Arc::new(profile), None)
            }
            Err(err) => {
                warn!(
                    backend = %mode,
                    error = %err,
                    "Hardware probe failed, falling back to software"
                );
                let reason = FallbackReason::ProbeFailed {
                    mode,
                    reason: err.to_string(),
                };
                (Arc::new(CapabilityProfile::software()), Some(reason))
            }
        }
    }
}

impl fmt::Debug for CapabilityCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityCache")
            .field("settings", &self.settings)
            .field("probed", &self.slots.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const VAINFO: &str = "\
vainfo: VA-API version: 1.20 (libva 2.20.0)
vainfo: Driver version: Intel iHD driver for Intel(R) Gen Graphics - 23.4.3
vainfo: Supported profile and entrypoints
      VAProfileNone                   :\tVAEntrypointVideoProc
      VAProfileMPEG2Simple            :\tVAEntrypointVLD
      VAProfileMPEG2Main              :\tVAEntrypointEncSlice
      VAProfileH264Main               :\tVAEntrypointVLD
      VAProfileH264High               :\tVAEntrypointEncSliceLP
      VAProfileHEVCMain10             :\tVAEntrypointVLD
      VAProfileVP9Profile0            :\tVAEntrypointVLD
";

    #[test]
    fn test_parse_vainfo() {
        let caps = parse_vainfo(VAINFO).unwrap();
        assert!(caps.decode.contains(&VideoCodec::H264));
        assert!(caps.decode.contains(&VideoCodec::Hevc));
        assert!(caps.decode.contains(&VideoCodec::Vp9));
        assert!(!caps.decode.contains(&VideoCodec::Av1));
        assert!(caps.encode.contains(&VideoCodec::H264));
        assert!(caps.encode.contains(&VideoCodec::Mpeg2));
        assert!(!caps.encode.contains(&VideoCodec::Hevc));
        assert!(caps.ten_bit);
        assert!(caps.driver.unwrap().starts_with("Intel iHD"));
    }

    #[test]
    fn test_parse_vainfo_without_profiles() {
        assert!(parse_vainfo("libva error: /usr/lib/dri/iHD_drv_video.so init failed").is_err());
    }

    #[test]
    fn test_parse_nvidia_smi() {
        let gpu = parse_nvidia_smi("NVIDIA GeForce RTX 3080, 8.6\n").unwrap();
        assert_eq!(gpu.name, "NVIDIA GeForce RTX 3080");
        assert_eq!((gpu.compute_major, gpu.compute_minor), (8, 6));

        assert!(parse_nvidia_smi("").is_err());
        assert!(parse_nvidia_smi("Tesla P4, [N/A]").is_err());
    }

    struct CountingProber {
        calls: Arc<AtomicUsize>,
    }

    impl CapabilityProber for CountingProber {
        fn probe(&self, mode: HwAccelMode, settings: &HardwareSettings) -> Result<CapabilityProfile> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CapabilityProfile::builtin(mode, settings))
        }
    }

    struct FailingProber;

    impl CapabilityProber for FailingProber {
        fn probe(&self, mode: HwAccelMode, _settings: &HardwareSettings) -> Result<CapabilityProfile> {
            Err(HwAccelError::probe(mode, "no device"))
        }
    }

    #[test]
    fn test_probe_runs_once_per_mode() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CapabilityCache::new(
            CountingProber { calls: Arc::clone(&calls) },
            HardwareSettings::new(HwAccelMode::Cuda),
        );
        assert!(!cache.is_probed(HwAccelMode::Cuda));

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let snapshot = cache.requested();
                    assert_eq!(snapshot.effective_mode(), HwAccelMode::Cuda);
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_probed(HwAccelMode::Cuda));

        cache.snapshot(HwAccelMode::Vaapi);
        cache.snapshot(HwAccelMode::Vaapi);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_probe_degrades_to_software() {
        let cache = CapabilityCache::new(FailingProber, HardwareSettings::new(HwAccelMode::Cuda));
        let snapshot = cache.requested();
        assert_eq!(snapshot.requested, HwAccelMode::Cuda);
        assert_eq!(snapshot.effective_mode(), HwAccelMode::None);
        assert!(matches!(
            snapshot.fallback,
            Some(FallbackReason::ProbeFailed { mode: HwAccelMode::Cuda, .. })
        ));
    }

    #[test]
    fn test_snapshots_share_profile() {
        let cache = CapabilityCache::new(
            CountingProber { calls: Arc::new(AtomicUsize::new(0)) },
            HardwareSettings::new(HwAccelMode::Vaapi),
        );
        let a = cache.requested();
        let b = cache.requested();
        assert!(Arc::ptr_eq(&a.profile, &b.profile));
    }
}
