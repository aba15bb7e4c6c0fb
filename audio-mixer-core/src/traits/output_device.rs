use std::sync::Arc;

use crate::models::error::MixerError;
use crate::models::format::StreamDescriptor;
use crate::traits::sample_source::SampleSource;

/// Why a capture or playback device stopped without being asked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStoppage {
    /// The endpoint disappeared (unplugged, disabled, default changed).
    DeviceRemoved(String),
    /// Any other driver-level failure on the device thread.
    Failed(String),
}

impl std::fmt::Display for DeviceStoppage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceRemoved(reason) => write!(f, "device removed: {reason}"),
            Self::Failed(reason) => write!(f, "device failed: {reason}"),
        }
    }
}

/// Notification fired from the device's own thread on unexpected stoppage.
pub type StoppageCallback = Arc<dyn Fn(DeviceStoppage) + Send + Sync + 'static>;

/// A playback endpoint that drives a pull source at device cadence.
pub trait OutputDevice: Send {
    /// Prepare playback of `source`, whose format the device must accept.
    fn init(
        &mut self,
        source: Arc<dyn SampleSource>,
        on_stopped: StoppageCallback,
    ) -> Result<(), MixerError>;

    /// Start the device callback loop.
    fn play(&mut self) -> Result<(), MixerError>;

    /// Stop playback. When this returns, the source is never pulled again.
    /// Must be idempotent.
    fn stop(&mut self);

    /// Format the device was initialized with.
    fn format(&self) -> Option<StreamDescriptor>;
}
