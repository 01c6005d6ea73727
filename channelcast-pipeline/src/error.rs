//! Pipeline error types.

use channelcast_core::Error as CoreError;
use channelcast_hwaccel::HwAccelError;
use thiserror::Error;

/// Pipeline error type.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Core error, including incomplete stream descriptors.
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Hardware layer error.
    #[error("Hardware error: {0}")]
    HwAccel(#[from] HwAccelError),

    /// The output container cannot carry the requested codec.
    #[error("Unsupported combination: {codec} cannot be muxed into {container}")]
    UnsupportedCombination { codec: String, container: String },

    /// Two steps disagree on ordering or preconditions.
    #[error("State transition conflict between {first} and {second}: {reason}")]
    StateTransitionConflict {
        first: String,
        second: String,
        reason: String,
    },

    /// A step's transition could not be evaluated.
    #[error("Step {step} failed: {reason}")]
    TransitionFailed { step: String, reason: String },

    /// The request cannot be satisfied by the given inputs.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Pipeline result type.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub(crate) fn transition(step: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::TransitionFailed {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error comes from a probed descriptor missing a field.
    pub fn is_incomplete_descriptor(&self) -> bool {
        matches!(
            self,
            PipelineError::Core(CoreError::IncompleteStreamDescriptor { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_combination_names_both() {
        let err = PipelineError::UnsupportedCombination {
            codec: "vp9".into(),
            container: "mpegts".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("vp9"));
        assert!(msg.contains("mpegts"));
    }

    #[test]
    fn test_incomplete_descriptor_passes_through() {
        let err: PipelineError = CoreError::missing(2, "height").into();
        assert!(err.is_incomplete_descriptor());
        assert!(!PipelineError::InvalidRequest("x".into()).is_incomplete_descriptor());
    }
}
