//! `DeviceBackend` over the MMDevice API.

use audio_mixer_core::{AudioDevice, CaptureProvider, DeviceBackend, DeviceKind, MixerError, OutputDevice};

use crate::com::ComGuard;
use crate::device_enumerator::DeviceEnumerator;
use crate::wasapi_capture::WasapiCapture;
use crate::wasapi_render::WasapiOutput;

/// Opens WASAPI endpoints for the mixer session.
///
/// Holds no COM state; every call joins the calling thread to COM for its
/// own duration, and each capture/render thread does the same.
#[derive(Debug, Clone, Copy, Default)]
pub struct WasapiBackend;

impl WasapiBackend {
    pub fn new() -> Self {
        Self
    }

    fn with_enumerator<T>(
        &self,
        f: impl FnOnce(&DeviceEnumerator) -> Result<T, MixerError>,
    ) -> Result<T, MixerError> {
        let _com = ComGuard::init()?;
        let enumerator = DeviceEnumerator::new()?;
        f(&enumerator)
    }
}

impl DeviceBackend for WasapiBackend {
    fn input_devices(&self) -> Result<Vec<AudioDevice>, MixerError> {
        self.with_enumerator(|e| e.list_devices(DeviceKind::Input))
    }

    fn output_devices(&self) -> Result<Vec<AudioDevice>, MixerError> {
        self.with_enumerator(|e| e.list_devices(DeviceKind::Output))
    }

    fn default_input_device(&self) -> Option<AudioDevice> {
        self.with_enumerator(|e| Ok(e.default_device(DeviceKind::Input))).ok().flatten()
    }

    fn default_output_device(&self) -> Option<AudioDevice> {
        self.with_enumerator(|e| Ok(e.default_device(DeviceKind::Output))).ok().flatten()
    }

    fn open_microphone(&self, device_id: &str) -> Result<Box<dyn CaptureProvider>, MixerError> {
        let device = self.with_enumerator(|e| e.find(device_id, DeviceKind::Input))?;
        Ok(Box::new(WasapiCapture::microphone(device)))
    }

    /// Loopback of the default render endpoint.
    fn open_loopback(&self) -> Result<Box<dyn CaptureProvider>, MixerError> {
        let device = self
            .default_output_device()
            .ok_or_else(|| MixerError::DeviceNotFound("no default render endpoint".into()))?;
        Ok(Box::new(WasapiCapture::loopback(device)))
    }

    fn open_output(&self, device_id: &str) -> Result<Box<dyn OutputDevice>, MixerError> {
        let device = self.with_enumerator(|e| e.find(device_id, DeviceKind::Output))?;
        Ok(Box::new(WasapiOutput::new(device)))
    }
}
