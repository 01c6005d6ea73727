//! Error types for the channelcast data model.
//!
//! Descriptor and registry errors live here; the pipeline and hardware crates
//! wrap [`Error`] in their own error enums.

use thiserror::Error;

/// Main error type for the stream and frame model.
#[derive(Error, Debug)]
pub enum Error {
    /// A probed stream lacks a field that every pipeline needs.
    #[error("Incomplete stream descriptor for stream {index}: missing {field}")]
    IncompleteStreamDescriptor { index: usize, field: &'static str },

    /// A probed value was present but could not be interpreted.
    #[error("Invalid value for {field} on stream {index}: {value}")]
    InvalidDescriptorValue {
        index: usize,
        field: &'static str,
        value: String,
    },

    /// Invalid parameter provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A frame state broke one of its invariants.
    #[error("Invalid frame state: {0}")]
    InvalidFrameState(String),

    /// Probe document could not be decoded.
    #[error("Probe document error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid parameter error.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Create an incomplete-descriptor error.
    pub fn missing(index: usize, field: &'static str) -> Self {
        Error::IncompleteStreamDescriptor { index, field }
    }

    /// Check if this error means the descriptor itself is unusable.
    #[must_use]
    pub fn is_descriptor_error(&self) -> bool {
        matches!(
            self,
            Error::IncompleteStreamDescriptor { .. } | Error::InvalidDescriptorValue { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::missing(0, "width");
        assert_eq!(
            err.to_string(),
            "Incomplete stream descriptor for stream 0: missing width"
        );
    }

    #[test]
    fn test_is_descriptor_error() {
        assert!(Error::missing(1, "codec_name").is_descriptor_error());
        assert!(!Error::invalid_param("x").is_descriptor_error());
    }
}
