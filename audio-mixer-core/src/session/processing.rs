use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::models::audio_models::{InputId, MicrophoneVariant, SessionDiagnostics};
use crate::models::config::SessionConfiguration;
use crate::models::error::MixerError;
use crate::models::format::StreamDescriptor;
use crate::processing::bridge::PushPullBridge;
use crate::processing::echo::EchoCancellationAdapter;
use crate::processing::gain::GainControl;
use crate::processing::levels::LevelMeter;
use crate::processing::mixer::MixingEngine;
use crate::processing::normalizer::normalize;
use crate::processing::resampler::{ResampledSource, Resampler};
use crate::session::output_sink::OutputSink;
use crate::traits::capture_provider::{AudioBufferCallback, CaptureProvider};
use crate::traits::device_backend::DeviceBackend;
use crate::traits::echo_strategy::EchoStrategy;
use crate::traits::output_device::{DeviceStoppage, StoppageCallback};
use crate::traits::sample_source::SampleSource;

/// Devices and options for one session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub input_device_id: String,
    pub output_device_id: String,
    pub use_echo_cancellation: bool,
}

/// A running capture provider and the bridges its blocks are written to.
///
/// The callback is installed before the native format is known, so bridges
/// are connected afterwards through a `OnceLock`. Blocks delivered before
/// that point are counted and dropped.
struct CaptureTap {
    label: &'static str,
    provider: Box<dyn CaptureProvider>,
    targets: Arc<OnceLock<Vec<Arc<PushPullBridge>>>>,
    callbacks: Arc<AtomicU64>,
    stopped: bool,
}

impl CaptureTap {
    fn start(
        label: &'static str,
        mut provider: Box<dyn CaptureProvider>,
        meter: Option<Arc<LevelMeter>>,
        on_stopped: StoppageCallback,
    ) -> Result<Self, MixerError> {
        let targets: Arc<OnceLock<Vec<Arc<PushPullBridge>>>> = Arc::new(OnceLock::new());
        let callbacks = Arc::new(AtomicU64::new(0));

        let callback: AudioBufferCallback = {
            let targets = Arc::clone(&targets);
            let callbacks = Arc::clone(&callbacks);
            let scratch = Mutex::new(Vec::<f32>::new());
            Arc::new(move |data: &[u8], format: &StreamDescriptor| {
                callbacks.fetch_add(1, Ordering::Relaxed);
                let Some(bridges) = targets.get() else {
                    return;
                };

                let mut samples = scratch.lock();
                if let Err(e) = normalize(format, data, &mut samples) {
                    log::debug!("Dropping {label} block: {e}");
                    return;
                }
                if let Some(ref meter) = meter {
                    meter.record_block(&samples);
                }
                for bridge in bridges {
                    if bridge.format() == format.to_float32() {
                        bridge.write(&samples);
                    }
                }
            })
        };

        provider.start(callback, on_stopped)?;
        log::info!("Started {label} capture on {}", provider.device_info().name);
        Ok(Self {
            label,
            provider,
            targets,
            callbacks,
            stopped: false,
        })
    }

    fn format(&self) -> Option<StreamDescriptor> {
        self.provider.format()
    }

    fn connect(&self, bridges: Vec<Arc<PushPullBridge>>) {
        if self.targets.set(bridges).is_err() {
            log::warn!("{} capture was already connected", self.label);
        }
    }

    fn callback_count(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    /// Stop the provider. No callback runs after this returns.
    fn stop(&mut self) {
        if !self.stopped {
            self.provider.stop();
            self.stopped = true;
            log::debug!("Stopped {} capture", self.label);
        }
    }
}

impl Drop for CaptureTap {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything owned by one start/stop cycle.
///
/// ```text
/// [Mic Provider] → normalize → [Mic Bridge] ──┬──────────────→ [Resampler] ─┐
///                                             └→ [EchoAdapter] ┘            ├→ [MixingEngine] → [OutputSink]
/// [Loopback] → normalize ──┬→ [System Bridge] ──→ [Resampler] ──────────────┘
///                          └→ [Reference Bridge] → [EchoAdapter]
/// ```
///
/// Built in the order output init, microphone start, loopback start,
/// wiring, play. Any fatal failure drops the partially built session, which
/// releases whatever was already acquired. Teardown stops captures first,
/// then the output device, and only then releases the graph.
pub struct ProcessingSession {
    id: String,
    started_at: String,
    mic: Option<CaptureTap>,
    system: Option<CaptureTap>,
    output: Option<OutputSink>,
    mixer: Arc<MixingEngine>,
    mic_slot: Option<InputId>,
    system_slot: Option<InputId>,
    mic_bridge: Option<Arc<PushPullBridge>>,
    system_bridge: Option<Arc<PushPullBridge>>,
    mic_format: Option<StreamDescriptor>,
    system_format: Option<StreamDescriptor>,
    variant: MicrophoneVariant,
    warnings: Vec<String>,
}

impl ProcessingSession {
    pub fn start(
        backend: &dyn DeviceBackend,
        config: &SessionConfiguration,
        request: &SessionRequest,
        echo_strategy: Box<dyn EchoStrategy>,
        microphone_gain: &GainControl,
        meter: Arc<LevelMeter>,
        on_stopped: StoppageCallback,
    ) -> Result<Self, MixerError> {
        config.validate()?;
        let canonical = config.canonical_format;
        let mixer = Arc::new(MixingEngine::new(canonical, config.max_block_frames));

        let mut session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            mic: None,
            system: None,
            output: None,
            mixer: Arc::clone(&mixer),
            mic_slot: None,
            system_slot: None,
            mic_bridge: None,
            system_bridge: None,
            mic_format: None,
            system_format: None,
            variant: MicrophoneVariant::Raw,
            warnings: Vec::new(),
        };
        log::info!(
            "Starting session {} (input {}, output {}, echo cancellation {})",
            session.id,
            request.input_device_id,
            request.output_device_id,
            request.use_echo_cancellation
        );

        let mut output = OutputSink::new(backend.open_output(&request.output_device_id)?);
        output.init(Arc::clone(&mixer) as Arc<dyn SampleSource>, Arc::clone(&on_stopped))?;
        session.output = Some(output);

        let mic_provider = backend.open_microphone(&request.input_device_id)?;
        let mic = session.mic.insert(CaptureTap::start("microphone", mic_provider, Some(meter), on_stopped)?);
        let mic_format = mic
            .format()
            .ok_or_else(|| MixerError::CaptureStartFailed("microphone did not report a stream format".into()))?;
        session.mic_format = Some(mic_format);
        log::info!("Microphone format: {mic_format}");

        session.start_system_audio(backend, config);

        let mic_bridge = Arc::new(PushPullBridge::new(
            mic_format.to_float32(),
            config.bridge_samples(&mic_format),
            config.discard_on_overflow,
        ));
        let mut mic_source: Arc<dyn SampleSource> = mic_bridge.clone();
        let mut system_targets = Vec::new();

        if let Some(system_format) = session.system_format {
            let system_bridge = Arc::new(PushPullBridge::new(
                system_format.to_float32(),
                config.bridge_samples(&system_format),
                config.discard_on_overflow,
            ));
            system_targets.push(Arc::clone(&system_bridge));

            if request.use_echo_cancellation {
                let reference = Arc::new(PushPullBridge::new(
                    system_format.to_float32(),
                    config.bridge_samples(&system_format),
                    config.discard_on_overflow,
                ));
                match EchoCancellationAdapter::attach(
                    mic_bridge.clone(),
                    reference.clone(),
                    echo_strategy,
                    config.max_block_frames,
                ) {
                    Ok(adapter) => {
                        mic_source = Arc::new(adapter);
                        system_targets.push(reference);
                        session.variant = MicrophoneVariant::EchoCancelled;
                    }
                    Err(e) => session.warn(format!("Echo cancellation disabled for this session: {e}")),
                }
            }

            let system_source = ResampledSource::new(system_bridge.clone(), canonical, config.max_block_frames)?;
            session.system_slot = Some(mixer.add_input(Arc::new(system_source), 1.0)?);
            session.system_bridge = Some(system_bridge);
        } else if request.use_echo_cancellation {
            session.warn("Echo cancellation needs system audio; using the raw microphone".into());
        }

        let mic_source = ResampledSource::new(mic_source, canonical, config.max_block_frames)?;
        let mic_slot = mixer.add_input(Arc::new(mic_source), microphone_gain.gain())?;
        if microphone_gain.is_muted() {
            mixer.set_mute(mic_slot, true)?;
        }
        session.mic_slot = Some(mic_slot);
        session.mic_bridge = Some(Arc::clone(&mic_bridge));

        if let Some(ref mic) = session.mic {
            mic.connect(vec![mic_bridge]);
        }
        if let Some(ref system) = session.system {
            system.connect(system_targets);
        }

        if let Some(ref mut output) = session.output {
            output.play()?;
        }
        log::info!(
            "Session {} active ({:?} microphone, system audio {})",
            session.id,
            session.variant,
            if session.system_slot.is_some() { "on" } else { "off" }
        );
        Ok(session)
    }

    /// Loopback capture is optional: any failure is a warning and the
    /// session continues with the microphone only. The same holds when
    /// loopback stops mid-session; its input then reads silence.
    fn start_system_audio(&mut self, backend: &dyn DeviceBackend, config: &SessionConfiguration) {
        let on_stopped: StoppageCallback = Arc::new(|stoppage: DeviceStoppage| {
            log::warn!("System audio capture stopped: {stoppage}");
        });
        let tap = match backend
            .open_loopback()
            .and_then(|provider| CaptureTap::start("system audio", provider, None, on_stopped))
        {
            Ok(tap) => tap,
            Err(e) => {
                self.warn(format!("System audio unavailable: {e}"));
                return;
            }
        };

        let Some(format) = tap.format() else {
            self.warn("System audio did not report a stream format".into());
            return;
        };
        if let Err(e) = Resampler::new(format.to_float32(), config.canonical_format) {
            self.warn(format!("System audio format {format} is not supported: {e}"));
            return;
        }

        log::info!("System audio format: {format}");
        self.system_format = Some(format);
        self.system = Some(tap);
    }

    fn warn(&mut self, message: String) {
        log::warn!("{message}");
        self.warnings.push(message);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mixer(&self) -> &Arc<MixingEngine> {
        &self.mixer
    }

    pub fn microphone_variant(&self) -> MicrophoneVariant {
        self.variant
    }

    pub fn has_system_audio(&self) -> bool {
        self.system_slot.is_some()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn set_microphone_gain(&self, gain: f32) -> Result<(), MixerError> {
        match self.mic_slot {
            Some(id) => self.mixer.set_gain(id, gain),
            None => Ok(()),
        }
    }

    pub fn set_microphone_mute(&self, muted: bool) -> Result<(), MixerError> {
        match self.mic_slot {
            Some(id) => self.mixer.set_mute(id, muted),
            None => Ok(()),
        }
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        let mic_stats = self.mic_bridge.as_ref().map(|b| b.stats()).unwrap_or_default();
        let system_stats = self.system_bridge.as_ref().map(|b| b.stats()).unwrap_or_default();
        SessionDiagnostics {
            session_id: self.id.clone(),
            started_at: self.started_at.clone(),
            mic_format: self.mic_format,
            system_format: self.system_format,
            microphone_variant: Some(self.variant),
            mic_callback_count: self.mic.as_ref().map(|t| t.callback_count()).unwrap_or(0),
            system_callback_count: self.system.as_ref().map(|t| t.callback_count()).unwrap_or(0),
            mic_overflow_drops: mic_stats.overflow_drops,
            system_overflow_drops: system_stats.overflow_drops,
            mic_underruns: mic_stats.underruns,
            system_underruns: system_stats.underruns,
            warnings: self.warnings.clone(),
        }
    }

    /// Stop captures, then the output device, then release mixer inputs.
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(ref mut mic) = self.mic {
            mic.stop();
        }
        if let Some(ref mut system) = self.system {
            system.stop();
        }
        if let Some(ref mut output) = self.output {
            output.stop();
        }
        for slot in [self.mic_slot.take(), self.system_slot.take()].into_iter().flatten() {
            if let Err(e) = self.mixer.remove_input(slot) {
                log::debug!("Mixer input {slot:?} already gone at teardown: {e}");
            }
        }
    }
}

impl Drop for ProcessingSession {
    fn drop(&mut self) {
        self.shutdown();
        log::info!("Session {} torn down", self.id);
    }
}

impl std::fmt::Debug for ProcessingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingSession")
            .field("id", &self.id)
            .field("variant", &self.variant)
            .field("mic_format", &self.mic_format)
            .field("system_format", &self.system_format)
            .finish_non_exhaustive()
    }
}
