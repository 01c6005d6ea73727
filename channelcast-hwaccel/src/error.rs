//! Error types for hardware acceleration.

use thiserror::Error;

/// Hardware acceleration error.
#[derive(Error, Debug)]
pub enum HwAccelError {
    /// Accelerator not supported on this platform.
    #[error("Accelerator {0} not supported on this platform")]
    NotSupported(String),

    /// An introspection tool ran but reported failure.
    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Probe output could not be interpreted.
    #[error("Failed to probe {mode}: {reason}")]
    ProbeFailed { mode: String, reason: String },

    /// Configuration error.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Spawning an introspection tool failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for hardware acceleration operations.
pub type Result<T> = std::result::Result<T, HwAccelError>;

impl HwAccelError {
    pub(crate) fn probe(mode: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        HwAccelError::ProbeFailed {
            mode: mode.to_string(),
            reason: reason.into(),
        }
    }
}
