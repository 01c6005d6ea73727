//! Software fallback resolution.
//!
//! Two things push a build back to software: the backend's probe failed, or
//! the backend cannot encode the requested codec. Neither is an error; both
//! are recorded as a [`FallbackReason`] so the caller can surface them.

use channelcast_core::VideoCodec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::detect::CapabilitySnapshot;
use crate::profile::CapabilityProfile;
use crate::HwAccelMode;

/// Why a build runs in software although hardware was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackReason {
    /// Capability probing for `mode` failed.
    ProbeFailed { mode: HwAccelMode, reason: String },
    /// `mode` has no encoder for `codec`.
    EncoderUnavailable { mode: HwAccelMode, codec: VideoCodec },
}

impl FallbackReason {
    /// The mode that was given up.
    pub fn mode(&self) -> HwAccelMode {
        match self {
            FallbackReason::ProbeFailed { mode, .. } => *mode,
            FallbackReason::EncoderUnavailable { mode, .. } => *mode,
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::ProbeFailed { mode, reason } => {
                write!(f, "{} probe failed: {}", mode.name(), reason)
            }
            FallbackReason::EncoderUnavailable { mode, codec } => {
                write!(f, "{} has no {} encoder", mode.name(), codec)
            }
        }
    }
}

/// Backend a build will actually use.
#[derive(Debug, Clone)]
pub struct BackendResolution {
    pub profile: Arc<CapabilityProfile>,
    pub fallback: Option<FallbackReason>,
}

impl BackendResolution {
    pub fn mode(&self) -> HwAccelMode {
        self.profile.mode
    }
}

/// Pick the backend for encoding `codec`, falling back to software when the
/// snapshot's profile has no encoder for it.
pub fn resolve_encoder_backend(
    snapshot: &CapabilitySnapshot,
    codec: &VideoCodec,
) -> BackendResolution {
    let profile = &snapshot.profile;
    if profile.mode.is_hardware() && !profile.has_encoder(codec) {
        warn!(
            backend = %profile.mode,
            codec = %codec,
            "No hardware encoder for target codec, falling back to software"
        );
        return BackendResolution {
            profile: Arc::new(CapabilityProfile::software()),
            fallback: Some(FallbackReason::EncoderUnavailable {
                mode: profile.mode,
                codec: codec.clone(),
            }),
        };
    }
    BackendResolution {
        profile: Arc::clone(profile),
        fallback: snapshot.fallback.clone(),
    }
}
