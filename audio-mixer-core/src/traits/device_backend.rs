use crate::models::audio_models::AudioDevice;
use crate::models::error::MixerError;
use crate::traits::capture_provider::CaptureProvider;
use crate::traits::output_device::OutputDevice;

/// Platform device layer: enumeration and opening of capture/playback endpoints.
pub trait DeviceBackend: Send + Sync {
    fn input_devices(&self) -> Result<Vec<AudioDevice>, MixerError>;

    fn output_devices(&self) -> Result<Vec<AudioDevice>, MixerError>;

    fn default_input_device(&self) -> Option<AudioDevice>;

    fn default_output_device(&self) -> Option<AudioDevice>;

    /// Open a microphone by id. Fails with `DeviceNotFound` for unknown ids.
    fn open_microphone(&self, device_id: &str) -> Result<Box<dyn CaptureProvider>, MixerError>;

    /// Open a loopback capture of the system output mix.
    fn open_loopback(&self) -> Result<Box<dyn CaptureProvider>, MixerError>;

    /// Open a playback endpoint by id. Fails with `DeviceNotFound` for unknown ids.
    fn open_output(&self, device_id: &str) -> Result<Box<dyn OutputDevice>, MixerError>;
}
