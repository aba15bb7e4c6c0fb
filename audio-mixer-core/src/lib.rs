//! # audio-mixer-core
//!
//! Platform-agnostic real-time audio mixing core.
//!
//! Mixes a microphone and a loopback capture of system audio into one
//! playback device, with per-input gain/mute and optional echo suppression.
//! Platform backends (Windows WASAPI) implement `DeviceBackend`,
//! `CaptureProvider` and `OutputDevice` and plug into the generic
//! `MixerSession`.
//!
//! ## Architecture
//!
//! ```text
//! audio-mixer-core (this crate)
//! ├── traits/       ← SampleSource, CaptureProvider, OutputDevice, DeviceBackend, SessionDelegate, EchoStrategy
//! ├── models/       ← StreamDescriptor, MixerError, SessionState, SessionConfiguration, MixerSettings
//! ├── processing/   ← normalizer, resampler, ring buffer + bridge, gain, mixing engine, echo adapter, levels
//! ├── session/      ← ProcessingSession, OutputSink, MixerSession (state machine), MixerController
//! └── storage/      ← settings persistence
//! ```
//!
//! Capture threads push device blocks into bridges; the output device's
//! thread pulls exact-size blocks through resamplers and the mixing engine.
//! The bridges are the only state shared between the two sides.

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{AudioDevice, DeviceKind, InputId, MicrophoneVariant, SessionDiagnostics};
pub use models::config::{percent_to_gain, DuckingConfig, MixerSettings, SessionConfiguration};
pub use models::error::MixerError;
pub use models::format::{SampleEncoding, StreamDescriptor, CANONICAL_FORMAT};
pub use models::state::SessionState;
pub use processing::bridge::PushPullBridge;
pub use processing::echo::{DuckingStrategy, EchoCancellationAdapter, PassThrough};
pub use processing::gain::GainControl;
pub use processing::mixer::MixingEngine;
pub use processing::normalizer::normalize;
pub use processing::resampler::{ResampledSource, Resampler};
pub use processing::ring_buffer::RingBuffer;
pub use session::controller::MixerController;
pub use session::mixer_session::{EchoStrategyFactory, MixerSession};
pub use session::output_sink::OutputSink;
pub use session::processing::{ProcessingSession, SessionRequest};
pub use storage::settings::SettingsStore;
pub use traits::capture_provider::{AudioBufferCallback, CaptureProvider};
pub use traits::device_backend::DeviceBackend;
pub use traits::echo_strategy::EchoStrategy;
pub use traits::output_device::{DeviceStoppage, OutputDevice, StoppageCallback};
pub use traits::sample_source::SampleSource;
pub use traits::session_delegate::SessionDelegate;
