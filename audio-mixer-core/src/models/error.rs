use thiserror::Error;

use super::audio_models::InputId;
use super::format::StreamDescriptor;

/// Errors raised by the mixing pipeline and session management.
///
/// Format and layout errors are configuration mistakes; device errors are
/// recoverable and surface as a failed session start.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MixerError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported channel layout: {from} ch -> {to} ch")]
    UnsupportedChannelLayout { from: u16, to: u16 },

    #[error("format mismatch: expected {expected}, got {actual}")]
    FormatMismatch {
        expected: StreamDescriptor,
        actual: StreamDescriptor,
    },

    #[error("echo reference format {reference} does not match microphone format {mic}")]
    IncompatibleReferenceFormat {
        mic: StreamDescriptor,
        reference: StreamDescriptor,
    },

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("device initialization failed: {0}")]
    DeviceInitFailed(String),

    #[error("capture start failed: {0}")]
    CaptureStartFailed(String),

    #[error("audio device lost: {0}")]
    DeviceLost(String),

    #[error("unknown mixer input: {0}")]
    UnknownInput(InputId),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

impl MixerError {
    /// Whether this error originates from an audio device rather than from
    /// the pipeline's own configuration.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound(_)
                | Self::DeviceInitFailed(_)
                | Self::CaptureStartFailed(_)
                | Self::DeviceLost(_)
        )
    }
}
