//! COM lifetime helpers shared by the WASAPI modules.

use std::ffi::c_void;

use windows::core::PWSTR;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::Media::Audio::AUDCLNT_E_DEVICE_INVALIDATED;
use windows::Win32::System::Com::{CoInitializeEx, CoTaskMemFree, CoUninitialize, COINIT_MULTITHREADED};

use audio_mixer_core::{DeviceStoppage, MixerError};

/// Classify an error that ended a running capture or render stream.
pub(crate) fn stoppage_for(error: &windows::core::Error) -> DeviceStoppage {
    if error.code() == AUDCLNT_E_DEVICE_INVALIDATED {
        DeviceStoppage::DeviceRemoved(error.message())
    } else {
        DeviceStoppage::Failed(error.to_string())
    }
}

/// Joins the calling thread to the multithreaded apartment for the guard's
/// lifetime.
///
/// A thread already in a single-threaded apartment keeps it; COM is usable
/// either way and the guard then leaves the apartment alone on drop.
pub(crate) struct ComGuard {
    owned: bool,
}

impl ComGuard {
    pub(crate) fn init() -> Result<Self, MixerError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self { owned: false });
        }
        hr.ok()
            .map_err(|e| MixerError::DeviceInitFailed(format!("CoInitializeEx failed: {e}")))?;
        Ok(Self { owned: true })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.owned {
            unsafe { CoUninitialize() };
        }
    }
}

/// Owns a buffer allocated by COM (`GetMixFormat`, `GetId`).
pub(crate) struct CoTaskMem<T>(pub(crate) *mut T);

impl<T> Drop for CoTaskMem<T> {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { CoTaskMemFree(Some(self.0 as *const c_void)) };
        }
    }
}

/// Copy a COM-allocated wide string and free it.
pub(crate) fn take_pwstr(value: PWSTR) -> Option<String> {
    let _owner = CoTaskMem(value.0);
    if value.is_null() {
        return None;
    }
    unsafe { value.to_string().ok() }
}

/// Null-terminated UTF-16 copy of `value`.
pub(crate) fn wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}
