use std::sync::Arc;

use crate::models::audio_models::AudioDevice;
use crate::models::error::MixerError;
use crate::models::format::StreamDescriptor;
use crate::traits::output_device::StoppageCallback;

/// Callback invoked when a raw capture block is available.
///
/// Parameters:
/// - `data`: Raw interleaved bytes exactly as the device delivered them.
/// - `format`: The device's native stream format describing `data`.
pub type AudioBufferCallback = Arc<dyn Fn(&[u8], &StreamDescriptor) + Send + Sync + 'static>;

/// A push source: a capture device that delivers blocks at its own cadence.
///
/// Implemented by:
/// - `WasapiCapture` in microphone mode (Windows)
/// - `WasapiCapture` in loopback mode (Windows)
pub trait CaptureProvider: Send {
    /// Start capturing, delivering blocks via `callback`.
    ///
    /// The callback fires on a driver-owned thread; keep processing minimal.
    /// `on_stopped` fires once, from that thread, if capture ends without a
    /// call to [`CaptureProvider::stop`].
    fn start(&mut self, callback: AudioBufferCallback, on_stopped: StoppageCallback) -> Result<(), MixerError>;

    /// Stop capturing. When this returns, no further callbacks are delivered.
    /// Must be idempotent.
    fn stop(&mut self);

    /// Native format of the running stream, `None` until known.
    fn format(&self) -> Option<StreamDescriptor>;

    /// Information about the device backing this provider.
    fn device_info(&self) -> AudioDevice;
}
