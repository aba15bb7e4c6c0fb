//! WASAPI shared-mode capture provider.
//!
//! One type covers both capture paths: a microphone capture endpoint, and
//! loopback of a render endpoint (the system output mix). Buffers are handed
//! to the `AudioBufferCallback` as raw bytes in the endpoint's mix format.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Media::Audio::{
    IAudioCaptureClient, IAudioClient, AUDCLNT_BUFFERFLAGS_SILENT, AUDCLNT_SHAREMODE_SHARED,
    AUDCLNT_STREAMFLAGS_LOOPBACK, AUDCLNT_STREAMFLAGS_NOPERSIST,
};
use windows::Win32::System::Com::CLSCTX_ALL;
use windows::Win32::System::Threading::AvSetMmThreadCharacteristicsW;

use audio_mixer_core::{
    AudioBufferCallback, AudioDevice, CaptureProvider, MixerError, StoppageCallback, StreamDescriptor,
};

use crate::com::{stoppage_for, wide, ComGuard, CoTaskMem};
use crate::device_enumerator::DeviceEnumerator;
use crate::wave_format::read_wave_format;

/// 100 ms in 100-nanosecond units.
const BUFFER_DURATION: i64 = 1_000_000;
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const START_TIMEOUT: Duration = Duration::from_secs(5);

/// Which side of an endpoint is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Microphone,
    /// Loopback of a render endpoint.
    Loopback,
}

impl CaptureMode {
    fn stream_flags(self) -> u32 {
        match self {
            Self::Microphone => AUDCLNT_STREAMFLAGS_NOPERSIST,
            Self::Loopback => AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
        }
    }

    fn thread_name(self) -> &'static str {
        match self {
            Self::Microphone => "wasapi-mic-capture",
            Self::Loopback => "wasapi-loopback-capture",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Microphone => f.write_str("microphone"),
            Self::Loopback => f.write_str("loopback"),
        }
    }
}

/// WASAPI capture on a dedicated thread registered with MMCSS.
///
/// `start` blocks until the capture thread has initialized the endpoint and
/// reported its mix format, so `format()` is known once `start` returns.
pub struct WasapiCapture {
    mode: CaptureMode,
    device: AudioDevice,
    format: Option<StreamDescriptor>,
    running: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl WasapiCapture {
    /// Capture from a microphone endpoint.
    pub fn microphone(device: AudioDevice) -> Self {
        Self::new(CaptureMode::Microphone, device)
    }

    /// Capture what is being played on a render endpoint.
    pub fn loopback(device: AudioDevice) -> Self {
        Self::new(CaptureMode::Loopback, device)
    }

    fn new(mode: CaptureMode, device: AudioDevice) -> Self {
        Self {
            mode,
            device,
            format: None,
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    fn abort_start(&mut self, handle: thread::JoinHandle<()>) {
        self.running.store(false, Ordering::SeqCst);
        let _ = handle.join();
    }
}

impl CaptureProvider for WasapiCapture {
    fn start(&mut self, callback: AudioBufferCallback, on_stopped: StoppageCallback) -> Result<(), MixerError> {
        if self.capture_handle.is_some() {
            return Err(MixerError::InvalidState(format!("{} capture already running", self.mode)));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let mode = self.mode;
        let device_id = self.device.id.clone();
        let (ready, started) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name(mode.thread_name().into())
            .spawn(move || {
                if let Err(e) = capture_loop(mode, &device_id, &running, &ready, &callback, &on_stopped) {
                    log::error!("{mode} capture failed to start: {e}");
                    // Only heard while `start` is still waiting.
                    let _ = ready.send(Err(e));
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| MixerError::CaptureStartFailed(format!("failed to spawn {} thread: {e}", self.mode)))?;

        match started.recv_timeout(START_TIMEOUT) {
            Ok(Ok(format)) => {
                log::info!("Started {} capture on {} ({format})", self.mode, self.device.name);
                self.format = Some(format);
                self.capture_handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                self.abort_start(handle);
                Err(e)
            }
            Err(_) => {
                self.abort_start(handle);
                Err(MixerError::CaptureStartFailed(format!(
                    "{} capture did not start within {START_TIMEOUT:?}",
                    self.mode
                )))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.take() {
            let _ = handle.join();
            log::info!("Stopped {} capture on {}", self.mode, self.device.name);
        }
    }

    fn format(&self) -> Option<StreamDescriptor> {
        self.format
    }

    fn device_info(&self) -> AudioDevice {
        self.device.clone()
    }
}

impl Drop for WasapiCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Capture loop running on the dedicated thread.
///
/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Open the endpoint by id
/// 3. Activate IAudioClient and read the mix format
/// 4. Initialize in shared mode (loopback flag for render endpoints)
/// 5. Get IAudioCaptureClient, register with MMCSS, Start
/// 6. Report the format, then poll for packets until stopped
///
/// Errors before step 6 are returned to `start`. A failure while polling
/// (endpoint removed, driver error) is reported through `on_stopped` unless
/// a stop was already requested.
fn capture_loop(
    mode: CaptureMode,
    device_id: &str,
    running: &AtomicBool,
    ready: &SyncSender<Result<StreamDescriptor, MixerError>>,
    callback: &AudioBufferCallback,
    on_stopped: &StoppageCallback,
) -> Result<(), MixerError> {
    let _com = ComGuard::init()?;
    let enumerator = DeviceEnumerator::new()?;
    let device = enumerator.endpoint(device_id)?;

    unsafe {
        let audio_client: IAudioClient = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| MixerError::DeviceInitFailed(format!("Activate failed: {e}")))?;

        let mix_format = CoTaskMem(
            audio_client
                .GetMixFormat()
                .map_err(|e| MixerError::DeviceInitFailed(format!("GetMixFormat failed: {e}")))?,
        );
        let format = read_wave_format(mix_format.0)?;

        audio_client
            .Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                mode.stream_flags(),
                BUFFER_DURATION,
                0,
                mix_format.0,
                None,
            )
            .map_err(|e| MixerError::DeviceInitFailed(format!("IAudioClient::Initialize ({mode}) failed: {e}")))?;

        let capture_client: IAudioCaptureClient = audio_client
            .GetService()
            .map_err(|e| MixerError::DeviceInitFailed(format!("GetService failed: {e}")))?;

        let mut task_index: u32 = 0;
        let task_name = wide("Pro Audio");
        let _mmcss_handle = AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);

        audio_client
            .Start()
            .map_err(|e| MixerError::CaptureStartFailed(format!("IAudioClient::Start failed: {e}")))?;
        let _ = ready.send(Ok(format));

        let result = poll_packets(&capture_client, &format, running, callback);
        let _ = audio_client.Stop();

        if let Err(e) = result {
            if running.swap(false, Ordering::SeqCst) {
                log::error!("{mode} capture stopped: {e}");
                on_stopped(stoppage_for(&e));
            }
        }
        Ok(())
    }
}

unsafe fn poll_packets(
    capture_client: &IAudioCaptureClient,
    format: &StreamDescriptor,
    running: &AtomicBool,
    callback: &AudioBufferCallback,
) -> windows::core::Result<()> {
    let block_align = format.block_align();
    let mut silence: Vec<u8> = Vec::new();

    while running.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);

        let mut packet_length = capture_client.GetNextPacketSize()?;

        while packet_length > 0 {
            let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
            let mut num_frames: u32 = 0;
            let mut flags: u32 = 0;

            capture_client.GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)?;

            if num_frames > 0 && !buffer_ptr.is_null() {
                let byte_len = num_frames as usize * block_align;
                if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                    if silence.len() < byte_len {
                        silence.resize(byte_len, 0);
                    }
                    callback(&silence[..byte_len], format);
                } else {
                    callback(std::slice::from_raw_parts(buffer_ptr, byte_len), format);
                }
            }

            capture_client.ReleaseBuffer(num_frames)?;
            packet_length = capture_client.GetNextPacketSize()?;
        }
    }
    Ok(())
}
