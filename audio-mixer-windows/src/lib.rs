//! # audio-mixer-windows
//!
//! Windows WASAPI backend for audio-mixer.
//!
//! Provides:
//! - `WasapiBackend`: `DeviceBackend` implementation used by `MixerSession`
//! - `WasapiCapture`: microphone capture, or loopback of a render endpoint
//! - `WasapiOutput`: shared-mode render output pulling the mixer
//! - `DeviceEnumerator`: endpoint enumeration via the MMDevice API
//!
//! ## Usage
//! ```ignore
//! use audio_mixer_core::{MixerController, SessionConfiguration, SettingsStore};
//! use audio_mixer_windows::WasapiBackend;
//!
//! let store = SettingsStore::default_location()?;
//! let controller = MixerController::new(WasapiBackend::new(), SessionConfiguration::default(), store)?;
//! controller.start()?;
//! ```

pub mod wave_format;

#[cfg(target_os = "windows")]
pub mod backend;
#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod wasapi_capture;
#[cfg(target_os = "windows")]
pub mod wasapi_render;

#[cfg(target_os = "windows")]
pub use backend::WasapiBackend;
#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_capture::{CaptureMode, WasapiCapture};
#[cfg(target_os = "windows")]
pub use wasapi_render::WasapiOutput;
