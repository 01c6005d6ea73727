//! CLI subcommand implementations.

pub mod build;
pub mod capabilities;

pub use build::CmdBuild;
pub use capabilities::CmdCapabilities;

use anyhow::Context;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Read and deserialize a JSON file, naming `what` in errors.
pub fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {} from {}", what, path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("parsing {} in {}", what, path.display()))
}
