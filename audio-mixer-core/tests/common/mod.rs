//! In-memory device backend for driving sessions without audio hardware.
//!
//! Captures are pushed by hand through a [`CaptureHandle`], and playback is
//! pulled by hand through an [`OutputHandle`], so every test controls exactly
//! which blocks flow through the pipeline.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use audio_mixer_core::{
    AudioBufferCallback, AudioDevice, CaptureProvider, DeviceBackend, DeviceKind, DeviceStoppage, MixerError,
    OutputDevice, SampleEncoding, SampleSource, SessionDelegate, SessionState, StoppageCallback, StreamDescriptor,
};

pub const MIC_ID: &str = "{mic-usb}";
pub const HEADSET_ID: &str = "{mic-headset}";
pub const SPEAKERS_ID: &str = "{out-speakers}";
pub const CABLE_ID: &str = "{out-virtual-cable}";

// --- Capture ---

#[derive(Default)]
struct CaptureShared {
    callback: Mutex<Option<AudioBufferCallback>>,
    on_stopped: Mutex<Option<StoppageCallback>>,
    starts: AtomicUsize,
    stopped: AtomicBool,
}

/// Test-side handle to a mock capture device.
#[derive(Clone)]
pub struct CaptureHandle {
    shared: Arc<CaptureShared>,
    format: StreamDescriptor,
}

impl CaptureHandle {
    /// Deliver one raw block as the device would, on the calling thread.
    pub fn push(&self, bytes: &[u8]) {
        let callback = self.shared.callback.lock().clone();
        if let Some(callback) = callback {
            callback(bytes, &self.format);
        }
    }

    pub fn push_samples(&self, samples: &[f32]) {
        self.push(&encode(self.format.encoding, samples));
    }

    pub fn is_running(&self) -> bool {
        self.shared.callback.lock().is_some()
    }

    pub fn was_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.shared.starts.load(Ordering::SeqCst)
    }

    /// Unplug the capture device: deliveries end and the stoppage is reported
    /// from the capture thread, the way a driver would.
    pub fn remove_device(&self) {
        self.shared.callback.lock().take();
        let on_stopped = self.shared.on_stopped.lock().take();
        if let Some(on_stopped) = on_stopped {
            thread::spawn(move || on_stopped(DeviceStoppage::DeviceRemoved("capture endpoint unplugged".into())))
                .join()
                .unwrap();
        }
    }
}

struct MockCapture {
    device: AudioDevice,
    format: Option<StreamDescriptor>,
    fail_start: bool,
    shared: Arc<CaptureShared>,
}

impl CaptureProvider for MockCapture {
    fn start(&mut self, callback: AudioBufferCallback, on_stopped: StoppageCallback) -> Result<(), MixerError> {
        if self.fail_start {
            return Err(MixerError::CaptureStartFailed(format!("{} is busy", self.device.name)));
        }
        self.shared.starts.fetch_add(1, Ordering::SeqCst);
        *self.shared.callback.lock() = Some(callback);
        *self.shared.on_stopped.lock() = Some(on_stopped);
        Ok(())
    }

    fn stop(&mut self) {
        *self.shared.callback.lock() = None;
        *self.shared.on_stopped.lock() = None;
        self.shared.stopped.store(true, Ordering::SeqCst);
    }

    fn format(&self) -> Option<StreamDescriptor> {
        self.format
    }

    fn device_info(&self) -> AudioDevice {
        self.device.clone()
    }
}

// --- Output ---

#[derive(Default)]
struct OutputShared {
    source: Mutex<Option<Arc<dyn SampleSource>>>,
    on_stopped: Mutex<Option<StoppageCallback>>,
    playing: AtomicBool,
    stopped: AtomicBool,
}

/// Test-side handle to a mock playback device.
#[derive(Clone)]
pub struct OutputHandle {
    shared: Arc<OutputShared>,
    pub device_id: String,
}

impl OutputHandle {
    /// Pull `frames` frames as the device callback would. `None` once the
    /// device is not playing.
    pub fn pull(&self, frames: usize) -> Option<Vec<f32>> {
        if !self.shared.playing.load(Ordering::SeqCst) {
            return None;
        }
        let source = self.shared.source.lock();
        let source = source.as_ref()?;
        let mut out = vec![f32::NAN; frames * source.format().channels as usize];
        source.read(&mut out);
        Some(out)
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    pub fn was_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Unplug the device: playback halts and the stoppage is reported from
    /// another thread, the way a driver would.
    pub fn remove_device(&self) {
        self.shared.playing.store(false, Ordering::SeqCst);
        let callback = self.shared.on_stopped.lock().clone();
        if let Some(callback) = callback {
            thread::spawn(move || callback(DeviceStoppage::DeviceRemoved("endpoint unplugged".into())))
                .join()
                .unwrap();
        }
    }
}

struct MockOutput {
    fail_init: bool,
    shared: Arc<OutputShared>,
    format: Option<StreamDescriptor>,
}

impl OutputDevice for MockOutput {
    fn init(&mut self, source: Arc<dyn SampleSource>, on_stopped: StoppageCallback) -> Result<(), MixerError> {
        if self.fail_init {
            return Err(MixerError::DeviceInitFailed("exclusive mode in use".into()));
        }
        self.format = Some(source.format());
        *self.shared.source.lock() = Some(source);
        *self.shared.on_stopped.lock() = Some(on_stopped);
        Ok(())
    }

    fn play(&mut self) -> Result<(), MixerError> {
        self.shared.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.playing.store(false, Ordering::SeqCst);
        self.shared.stopped.store(true, Ordering::SeqCst);
        // Waits for any in-flight pull, which holds this lock.
        *self.shared.source.lock() = None;
        *self.shared.on_stopped.lock() = None;
    }

    fn format(&self) -> Option<StreamDescriptor> {
        self.format
    }
}

// --- Backend ---

/// How the loopback capture behaves when opened.
#[derive(Debug, Clone, Copy)]
pub enum Loopback {
    Available(StreamDescriptor),
    OpenFails,
}

#[derive(Default)]
struct Handles {
    microphone: Mutex<Option<CaptureHandle>>,
    system: Mutex<Option<CaptureHandle>>,
    output: Mutex<Option<OutputHandle>>,
}

/// Handles to whatever devices the most recent session opened.
#[derive(Clone, Default)]
pub struct DeviceHandles(Arc<Handles>);

impl DeviceHandles {
    pub fn microphone(&self) -> CaptureHandle {
        self.0.microphone.lock().clone().expect("microphone was not opened")
    }

    pub fn system(&self) -> Option<CaptureHandle> {
        self.0.system.lock().clone()
    }

    pub fn output(&self) -> OutputHandle {
        self.0.output.lock().clone().expect("output was not opened")
    }

    pub fn try_output(&self) -> Option<OutputHandle> {
        self.0.output.lock().clone()
    }
}

pub struct MockBackend {
    pub mic_format: Option<StreamDescriptor>,
    pub loopback: Loopback,
    pub fail_mic_start: bool,
    pub fail_output_init: bool,
    pub default_input: Option<&'static str>,
    pub default_output: Option<&'static str>,
    handles: DeviceHandles,
}

impl MockBackend {
    pub fn new(mic_format: StreamDescriptor, loopback: Loopback) -> Self {
        Self {
            mic_format: Some(mic_format),
            loopback,
            fail_mic_start: false,
            fail_output_init: false,
            default_input: Some(MIC_ID),
            default_output: Some(SPEAKERS_ID),
            handles: DeviceHandles::default(),
        }
    }

    pub fn handles(&self) -> DeviceHandles {
        self.handles.clone()
    }

    fn device(id: &str, kind: DeviceKind, default: Option<&str>) -> AudioDevice {
        AudioDevice {
            id: id.to_string(),
            name: format!("Mock {id}"),
            kind,
            is_default: default == Some(id),
        }
    }
}

impl DeviceBackend for MockBackend {
    fn input_devices(&self) -> Result<Vec<AudioDevice>, MixerError> {
        Ok([MIC_ID, HEADSET_ID]
            .iter()
            .map(|id| Self::device(id, DeviceKind::Input, self.default_input))
            .collect())
    }

    fn output_devices(&self) -> Result<Vec<AudioDevice>, MixerError> {
        Ok([SPEAKERS_ID, CABLE_ID]
            .iter()
            .map(|id| Self::device(id, DeviceKind::Output, self.default_output))
            .collect())
    }

    fn default_input_device(&self) -> Option<AudioDevice> {
        self.default_input.map(|id| Self::device(id, DeviceKind::Input, self.default_input))
    }

    fn default_output_device(&self) -> Option<AudioDevice> {
        self.default_output.map(|id| Self::device(id, DeviceKind::Output, self.default_output))
    }

    fn open_microphone(&self, device_id: &str) -> Result<Box<dyn CaptureProvider>, MixerError> {
        if device_id != MIC_ID && device_id != HEADSET_ID {
            return Err(MixerError::DeviceNotFound(device_id.to_string()));
        }
        let shared = Arc::new(CaptureShared::default());
        let format = self.mic_format.unwrap_or(StreamDescriptor::float32(48_000, 2));
        *self.handles.0.microphone.lock() = Some(CaptureHandle {
            shared: Arc::clone(&shared),
            format,
        });
        Ok(Box::new(MockCapture {
            device: Self::device(device_id, DeviceKind::Input, self.default_input),
            format: self.mic_format,
            fail_start: self.fail_mic_start,
            shared,
        }))
    }

    fn open_loopback(&self) -> Result<Box<dyn CaptureProvider>, MixerError> {
        let format = match self.loopback {
            Loopback::Available(format) => format,
            Loopback::OpenFails => {
                return Err(MixerError::DeviceInitFailed("no active render endpoint".into()));
            }
        };
        let shared = Arc::new(CaptureShared::default());
        *self.handles.0.system.lock() = Some(CaptureHandle {
            shared: Arc::clone(&shared),
            format,
        });
        Ok(Box::new(MockCapture {
            device: Self::device("{loopback}", DeviceKind::Output, None),
            format: Some(format),
            fail_start: false,
            shared,
        }))
    }

    fn open_output(&self, device_id: &str) -> Result<Box<dyn OutputDevice>, MixerError> {
        if device_id != SPEAKERS_ID && device_id != CABLE_ID {
            return Err(MixerError::DeviceNotFound(device_id.to_string()));
        }
        let shared = Arc::new(OutputShared::default());
        *self.handles.0.output.lock() = Some(OutputHandle {
            shared: Arc::clone(&shared),
            device_id: device_id.to_string(),
        });
        Ok(Box::new(MockOutput {
            fail_init: self.fail_output_init,
            shared,
            format: None,
        }))
    }
}

// --- Delegate ---

#[derive(Default)]
pub struct RecordingDelegate {
    pub states: Mutex<Vec<SessionState>>,
    pub warnings: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<MixerError>>,
    pub levels: Mutex<Vec<f32>>,
}

impl SessionDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: SessionState) {
        self.states.lock().push(state);
    }

    fn on_microphone_level(&self, level: f32) {
        self.levels.lock().push(level);
    }

    fn on_warning(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }

    fn on_error(&self, error: &MixerError) {
        self.errors.lock().push(error.clone());
    }
}

// --- Helpers ---

/// Encode float samples in `encoding` (little-endian), as a driver would deliver them.
pub fn encode(encoding: SampleEncoding, samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * encoding.bytes_per_sample());
    for &sample in samples {
        match encoding {
            SampleEncoding::Pcm16 => {
                let value = (sample * 32_768.0).clamp(-32_768.0, 32_767.0) as i16;
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            SampleEncoding::Pcm24 => {
                let value = (sample * 8_388_608.0).clamp(-8_388_608.0, 8_388_607.0) as i32;
                bytes.extend_from_slice(&value.to_le_bytes()[..3]);
            }
            SampleEncoding::Pcm32 => {
                let value = (f64::from(sample) * 2_147_483_648.0).clamp(-2_147_483_648.0, 2_147_483_647.0) as i32;
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            SampleEncoding::Float32 => bytes.extend_from_slice(&sample.to_le_bytes()),
        }
    }
    bytes
}

/// Poll `condition` until it holds or two seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn constant(frames: usize, channels: u16, value: f32) -> Vec<f32> {
    vec![value; frames * channels as usize]
}
