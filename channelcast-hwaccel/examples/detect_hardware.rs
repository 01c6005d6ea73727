//! Hardware detection example.
//!
//! Probes every acceleration backend on this machine and prints the profile
//! each one would give a pipeline.
//!
//! Run with:
//! ```sh
//! cargo run --example detect_hardware -p channelcast-hwaccel
//! ```

use channelcast_hwaccel::{CapabilityCache, HardwareSettings, HwAccelMode, SystemProber};

fn main() {
    println!("Hardware Acceleration Detection");
    println!("================================\n");

    let cache = CapabilityCache::new(SystemProber, HardwareSettings::default());

    for mode in HwAccelMode::ALL {
        let snapshot = cache.snapshot(mode);
        let profile = &snapshot.profile;
        match &snapshot.fallback {
            Some(reason) => println!("  {:<13} unavailable ({})", mode.name(), reason),
            None => {
                let encoders: Vec<_> = profile.encoders.values().map(String::as_str).collect();
                let decoders: Vec<_> = profile.decoders.keys().map(|c| c.to_string()).collect();
                println!("  {:<13} available", mode.name());
                println!("      encoders: {}", encoders.join(", "));
                if !decoders.is_empty() {
                    println!("      decodes:  {}", decoders.join(", "));
                }
            }
        }
    }
}
