//! WASAPI shared-mode render output.
//!
//! The render thread owns every COM object. It opens and initializes the
//! endpoint during `init`, waits for `play`, then keeps the endpoint buffer
//! topped up by pulling the mixer source straight into it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Media::Audio::{
    IAudioClient, IAudioRenderClient, AUDCLNT_SHAREMODE_SHARED,
    AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM, AUDCLNT_STREAMFLAGS_NOPERSIST, AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
};
use windows::Win32::System::Com::CLSCTX_ALL;
use windows::Win32::System::Threading::AvSetMmThreadCharacteristicsW;

use audio_mixer_core::{
    AudioDevice, MixerError, OutputDevice, SampleEncoding, SampleSource, StoppageCallback,
    StreamDescriptor,
};

use crate::com::{stoppage_for, wide, ComGuard};
use crate::device_enumerator::DeviceEnumerator;
use crate::wave_format::{to_wave_format, WaveFormatFields};

/// 100 ms in 100-nanosecond units.
const BUFFER_DURATION: i64 = 1_000_000;
const POLL_INTERVAL: Duration = Duration::from_millis(5);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type Handshake = Result<(), MixerError>;

struct RenderThread {
    handle: thread::JoinHandle<()>,
    play: Option<Sender<()>>,
    acks: Receiver<Handshake>,
}

/// A playback endpoint driven by a polling render thread.
///
/// The stream is opened in the source's Float32 format; the audio engine
/// converts to the endpoint's mix format.
pub struct WasapiOutput {
    device: AudioDevice,
    format: Option<StreamDescriptor>,
    running: Arc<AtomicBool>,
    render: Option<RenderThread>,
}

impl WasapiOutput {
    pub fn new(device: AudioDevice) -> Self {
        Self {
            device,
            format: None,
            running: Arc::new(AtomicBool::new(false)),
            render: None,
        }
    }

    pub fn device(&self) -> &AudioDevice {
        &self.device
    }
}

fn await_ack(acks: &Receiver<Handshake>, step: &str) -> Handshake {
    acks.recv_timeout(HANDSHAKE_TIMEOUT)
        .unwrap_or_else(|_| Err(MixerError::DeviceInitFailed(format!("render thread did not {step}"))))
}

impl OutputDevice for WasapiOutput {
    fn init(&mut self, source: Arc<dyn SampleSource>, on_stopped: StoppageCallback) -> Result<(), MixerError> {
        if self.render.is_some() {
            return Err(MixerError::InvalidState("render output already initialized".into()));
        }
        let format = source.format();
        if format.encoding != SampleEncoding::Float32 {
            return Err(MixerError::UnsupportedFormat(format!("render source must be Float32, got {format}")));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let device_id = self.device.id.clone();
        let (ack, acks) = mpsc::sync_channel(1);
        let (play, play_requests) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("wasapi-render".into())
            .spawn(move || render_thread(&device_id, source, &running, &ack, &play_requests, &on_stopped))
            .map_err(|e| MixerError::DeviceInitFailed(format!("failed to spawn render thread: {e}")))?;

        let render = RenderThread {
            handle,
            play: Some(play),
            acks,
        };
        if let Err(e) = await_ack(&render.acks, "initialize") {
            self.running.store(false, Ordering::SeqCst);
            drop(render.play);
            let _ = render.handle.join();
            return Err(e);
        }

        log::info!("Render output ready on {} ({format})", self.device.name);
        self.format = Some(format);
        self.render = Some(render);
        Ok(())
    }

    fn play(&mut self) -> Result<(), MixerError> {
        let render = self
            .render
            .as_mut()
            .ok_or_else(|| MixerError::InvalidState("render output not initialized".into()))?;
        let play = render
            .play
            .take()
            .ok_or_else(|| MixerError::InvalidState("render output already playing".into()))?;
        play.send(())
            .map_err(|_| MixerError::DeviceInitFailed("render thread exited before playback".into()))?;
        await_ack(&render.acks, "start")
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(render) = self.render.take() {
            drop(render.play);
            let _ = render.handle.join();
            log::info!("Stopped render output on {}", self.device.name);
        }
    }

    fn format(&self) -> Option<StreamDescriptor> {
        self.format
    }
}

impl Drop for WasapiOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

struct RenderStream {
    audio_client: IAudioClient,
    render_client: IAudioRenderClient,
    buffer_frames: u32,
    channels: usize,
}

impl RenderStream {
    fn open(enumerator: &DeviceEnumerator, device_id: &str, format: &StreamDescriptor) -> Result<Self, MixerError> {
        let device = enumerator.endpoint(device_id)?;
        let wave_format = to_wave_format(&WaveFormatFields::float32(format));
        unsafe {
            let audio_client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| MixerError::DeviceInitFailed(format!("Activate failed: {e}")))?;

            audio_client
                .Initialize(
                    AUDCLNT_SHAREMODE_SHARED,
                    AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM
                        | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY
                        | AUDCLNT_STREAMFLAGS_NOPERSIST,
                    BUFFER_DURATION,
                    0,
                    &wave_format,
                    None,
                )
                .map_err(|e| MixerError::DeviceInitFailed(format!("IAudioClient::Initialize (render) failed: {e}")))?;

            let buffer_frames = audio_client
                .GetBufferSize()
                .map_err(|e| MixerError::DeviceInitFailed(format!("GetBufferSize failed: {e}")))?;
            let render_client: IAudioRenderClient = audio_client
                .GetService()
                .map_err(|e| MixerError::DeviceInitFailed(format!("GetService failed: {e}")))?;

            Ok(Self {
                audio_client,
                render_client,
                buffer_frames,
                channels: format.channels as usize,
            })
        }
    }

    /// Pull from `source` into the endpoint buffer until `running` clears.
    unsafe fn run(&self, source: &dyn SampleSource, running: &AtomicBool) -> windows::core::Result<()> {
        while running.load(Ordering::SeqCst) {
            let padding = self.audio_client.GetCurrentPadding()?;
            let frames = self.buffer_frames.saturating_sub(padding);
            if frames > 0 {
                let data = self.render_client.GetBuffer(frames)?;
                let out = std::slice::from_raw_parts_mut(data as *mut f32, frames as usize * self.channels);
                source.read(out);
                self.render_client.ReleaseBuffer(frames, 0)?;
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}

/// Render thread body.
///
/// Sequence:
/// 1. CoInitializeEx (MTA), open and initialize the endpoint, ack `init`
/// 2. Wait for `play` (a dropped sender means stop before play)
/// 3. Register with MMCSS, Start, ack `play`
/// 4. Poll padding and fill the buffer until stopped
fn render_thread(
    device_id: &str,
    source: Arc<dyn SampleSource>,
    running: &AtomicBool,
    ack: &SyncSender<Handshake>,
    play_requests: &Receiver<()>,
    on_stopped: &StoppageCallback,
) {
    let com = ComGuard::init();
    let opened = com.and_then(|com| {
        let enumerator = DeviceEnumerator::new()?;
        let stream = RenderStream::open(&enumerator, device_id, &source.format())?;
        Ok((com, stream))
    });
    let (_com, stream) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ack.send(Err(e));
            return;
        }
    };
    let _ = ack.send(Ok(()));

    if play_requests.recv().is_err() {
        return;
    }

    let mut task_index: u32 = 0;
    let task_name = wide("Pro Audio");
    let _mmcss_handle = unsafe { AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) };

    if let Err(e) = unsafe { stream.audio_client.Start() } {
        let _ = ack.send(Err(MixerError::DeviceInitFailed(format!("IAudioClient::Start failed: {e}"))));
        return;
    }
    let _ = ack.send(Ok(()));

    let result = unsafe { stream.run(source.as_ref(), running) };
    let _ = unsafe { stream.audio_client.Stop() };

    if let Err(e) = result {
        // A requested stop has already cleared `running`.
        if running.swap(false, Ordering::SeqCst) {
            log::error!("Render thread failed: {e}");
            on_stopped(stoppage_for(&e));
        }
    }
}
