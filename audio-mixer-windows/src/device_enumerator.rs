//! Windows audio device enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list capture (microphone) and render
//! (playback) endpoints with friendly names and default flags.

use windows::core::PCWSTR;
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::{
    eCapture, eConsole, eRender, EDataFlow, IMMDevice, IMMDeviceEnumerator, MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_ALL, STGM_READ};
use windows::Win32::System::Variant::VT_LPWSTR;

use audio_mixer_core::{AudioDevice, DeviceKind, MixerError};

use crate::com::{take_pwstr, wide};

fn data_flow(kind: DeviceKind) -> EDataFlow {
    match kind {
        DeviceKind::Input => eCapture,
        DeviceKind::Output => eRender,
    }
}

/// Audio device enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Create a new device enumerator.
    ///
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> Result<Self, MixerError> {
        let enumerator: IMMDeviceEnumerator = unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
            .map_err(|e| MixerError::DeviceInitFailed(format!("failed to create device enumerator: {e}")))?;
        Ok(Self { enumerator })
    }

    /// List active endpoints of one direction.
    pub fn list_devices(&self, kind: DeviceKind) -> Result<Vec<AudioDevice>, MixerError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(data_flow(kind), DEVICE_STATE_ACTIVE)
                .map_err(|e| MixerError::DeviceInitFailed(format!("EnumAudioEndpoints failed: {e}")))?;
            let count = collection
                .GetCount()
                .map_err(|e| MixerError::DeviceInitFailed(format!("GetCount failed: {e}")))?;

            let default_id = self.default_device_id(kind);
            let mut devices = Vec::with_capacity(count as usize);
            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let Some(id) = device.GetId().ok().and_then(take_pwstr) else {
                    continue;
                };
                let name = friendly_name(&device).unwrap_or_else(|| format!("Device {i}"));
                let is_default = default_id.as_deref() == Some(id.as_str());
                devices.push(AudioDevice {
                    id,
                    name,
                    kind,
                    is_default,
                });
            }
            Ok(devices)
        }
    }

    /// The console-role default endpoint, if one exists.
    pub fn default_device(&self, kind: DeviceKind) -> Option<AudioDevice> {
        let default_id = self.default_device_id(kind)?;
        self.list_devices(kind)
            .ok()?
            .into_iter()
            .find(|device| device.id == default_id)
    }

    /// Look up an active endpoint by id.
    pub fn find(&self, device_id: &str, kind: DeviceKind) -> Result<AudioDevice, MixerError> {
        self.list_devices(kind)?
            .into_iter()
            .find(|device| device.id == device_id)
            .ok_or_else(|| MixerError::DeviceNotFound(device_id.to_string()))
    }

    /// Open the endpoint object for `device_id`.
    pub fn endpoint(&self, device_id: &str) -> Result<IMMDevice, MixerError> {
        let id = wide(device_id);
        unsafe { self.enumerator.GetDevice(PCWSTR(id.as_ptr())) }
            .map_err(|_| MixerError::DeviceNotFound(device_id.to_string()))
    }

    fn default_device_id(&self, kind: DeviceKind) -> Option<String> {
        unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(data_flow(kind), eConsole)
                .ok()
                .and_then(|device| device.GetId().ok())
                .and_then(take_pwstr)
        }
    }
}

/// Read the PKEY_Device_FriendlyName property from a device.
fn friendly_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;
        let value = store.GetValue(&PKEY_Device_FriendlyName).ok()?;
        if value.vt() != VT_LPWSTR.0 {
            return None;
        }
        Some(value.to_string()).filter(|name| !name.is_empty())
    }
}
