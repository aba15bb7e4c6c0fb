use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::SessionDiagnostics;
use crate::models::config::{percent_to_gain, SessionConfiguration};
use crate::models::error::MixerError;
use crate::models::state::SessionState;
use crate::processing::echo::DuckingStrategy;
use crate::processing::gain::GainControl;
use crate::processing::levels::LevelMeter;
use crate::session::processing::{ProcessingSession, SessionRequest};
use crate::traits::device_backend::DeviceBackend;
use crate::traits::echo_strategy::EchoStrategy;
use crate::traits::output_device::{DeviceStoppage, StoppageCallback};
use crate::traits::session_delegate::SessionDelegate;

/// Builds a fresh echo strategy for each session start.
pub type EchoStrategyFactory = Arc<dyn Fn() -> Box<dyn EchoStrategy> + Send + Sync>;

enum MonitorEvent {
    Stopped(DeviceStoppage),
    Shutdown,
}

struct Monitor {
    handle: thread::JoinHandle<()>,
    events: mpsc::Sender<MonitorEvent>,
}

impl Monitor {
    fn shutdown(self) {
        let _ = self.events.send(MonitorEvent::Shutdown);
        // A delegate may stop the session from inside a monitor callback.
        if self.handle.thread().id() != thread::current().id() {
            let _ = self.handle.join();
        }
    }
}

struct Inner {
    state: SessionState,
    processing: Option<ProcessingSession>,
    monitor: Option<Monitor>,
    last_diagnostics: SessionDiagnostics,
}

/// State shared between the session handle and its monitor thread.
struct Shared {
    inner: Mutex<Inner>,
    delegate: Mutex<Option<Arc<dyn SessionDelegate>>>,
    meter: Arc<LevelMeter>,
    microphone_gain: GainControl,
}

impl Shared {
    fn delegate(&self) -> Option<Arc<dyn SessionDelegate>> {
        self.delegate.lock().clone()
    }

    fn notify_state(&self, state: SessionState) {
        if let Some(delegate) = self.delegate() {
            delegate.on_state_changed(state);
        }
    }

    /// Move to `next`, which must be a legal transition from the current state.
    fn transition(inner: &mut Inner, next: SessionState) {
        debug_assert!(
            inner.state.can_transition_to(next),
            "illegal session transition {} -> {}",
            inner.state,
            next
        );
        log::debug!("Session state {} -> {}", inner.state, next);
        inner.state = next;
    }

    fn microphone_level(&self) -> f32 {
        if self.microphone_gain.is_muted() || !self.inner.lock().state.is_active() {
            0.0
        } else {
            self.meter.peak()
        }
    }

    /// Tear down after the microphone or output device stopped on its own.
    fn handle_stoppage(&self, stoppage: DeviceStoppage) {
        let processing = {
            let mut inner = self.inner.lock();
            if !inner.state.is_active() {
                return;
            }
            Self::transition(&mut inner, SessionState::Stopping);
            inner.processing.take()
        };
        log::error!("Device stopped unexpectedly: {stoppage}");
        self.notify_state(SessionState::Stopping);

        let diagnostics = processing.map(|mut processing| {
            processing.shutdown();
            processing.diagnostics()
        });

        {
            let mut inner = self.inner.lock();
            if let Some(diagnostics) = diagnostics {
                inner.last_diagnostics = diagnostics;
            }
            Self::transition(&mut inner, SessionState::Idle);
        }
        self.notify_state(SessionState::Idle);

        if let Some(delegate) = self.delegate() {
            delegate.on_error(&MixerError::DeviceLost(stoppage.to_string()));
        }
    }

    fn run_monitor(&self, events: mpsc::Receiver<MonitorEvent>, interval: Duration) {
        loop {
            match events.recv_timeout(interval) {
                Ok(MonitorEvent::Stopped(stoppage)) => {
                    self.handle_stoppage(stoppage);
                    break;
                }
                Ok(MonitorEvent::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(delegate) = self.delegate() {
                        delegate.on_microphone_level(self.microphone_level());
                    }
                }
            }
        }
    }
}

/// The session state machine and the interface consumed by UI glue.
///
/// ```text
/// start_session → [Idle → Starting → Active]
///                              ↓ output device lost (monitor thread)
/// stop_session  → [Active → Stopping → Idle]
/// ```
///
/// Microphone gain and mute are held here as well as on the mixer slot, so
/// values set while idle apply to the next session.
pub struct MixerSession<B: DeviceBackend> {
    backend: B,
    config: SessionConfiguration,
    shared: Arc<Shared>,
    echo_strategy: EchoStrategyFactory,
}

impl<B: DeviceBackend> MixerSession<B> {
    pub fn new(backend: B, config: SessionConfiguration) -> Result<Self, MixerError> {
        config.validate()?;
        let ducking = config.ducking;
        Ok(Self {
            backend,
            config,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: SessionState::Idle,
                    processing: None,
                    monitor: None,
                    last_diagnostics: SessionDiagnostics::default(),
                }),
                delegate: Mutex::new(None),
                meter: Arc::new(LevelMeter::new()),
                microphone_gain: GainControl::new(1.0),
            }),
            echo_strategy: Arc::new(move || Box::new(DuckingStrategy::new(ducking)) as Box<dyn EchoStrategy>),
        })
    }

    /// Replace the echo strategy used by subsequent sessions.
    pub fn with_echo_strategy(mut self, factory: EchoStrategyFactory) -> Self {
        self.echo_strategy = factory;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &SessionConfiguration {
        &self.config
    }

    pub fn set_delegate(&self, delegate: Arc<dyn SessionDelegate>) {
        *self.shared.delegate.lock() = Some(delegate);
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state
    }

    /// Start mixing microphone (and system audio, when available) into the
    /// output device.
    ///
    /// Device failures return the session to `Idle` with nothing left running.
    pub fn start_session(
        &self,
        input_device_id: &str,
        output_device_id: &str,
        use_echo_cancellation: bool,
    ) -> Result<(), MixerError> {
        let stale_monitor = {
            let mut inner = self.shared.inner.lock();
            if !inner.state.is_idle() {
                return Err(MixerError::InvalidState(format!(
                    "cannot start a session while {}",
                    inner.state
                )));
            }
            Shared::transition(&mut inner, SessionState::Starting);
            inner.monitor.take()
        };
        if let Some(monitor) = stale_monitor {
            monitor.shutdown();
        }
        self.shared.notify_state(SessionState::Starting);

        let (events, receiver) = mpsc::channel();
        let on_stopped: StoppageCallback = {
            let events = events.clone();
            Arc::new(move |stoppage: DeviceStoppage| {
                let _ = events.send(MonitorEvent::Stopped(stoppage));
            })
        };

        let request = SessionRequest {
            input_device_id: input_device_id.to_string(),
            output_device_id: output_device_id.to_string(),
            use_echo_cancellation,
        };
        self.shared.meter.reset();
        let started = ProcessingSession::start(
            &self.backend,
            &self.config,
            &request,
            (self.echo_strategy)(),
            &self.shared.microphone_gain,
            Arc::clone(&self.shared.meter),
            on_stopped,
        );

        let processing = match started {
            Ok(processing) => processing,
            Err(e) => {
                log::error!("Failed to start session: {e}");
                Shared::transition(&mut self.shared.inner.lock(), SessionState::Idle);
                self.shared.notify_state(SessionState::Idle);
                return Err(e);
            }
        };

        let warnings = processing.warnings().to_vec();
        {
            let mut inner = self.shared.inner.lock();
            inner.processing = Some(processing);
            Shared::transition(&mut inner, SessionState::Active);

            let shared = Arc::clone(&self.shared);
            let interval = self.config.level_interval;
            let handle = thread::Builder::new()
                .name("mixer-session-monitor".into())
                .spawn(move || shared.run_monitor(receiver, interval))
                .expect("failed to spawn session monitor thread");
            inner.monitor = Some(Monitor { handle, events });
        }

        if let Some(delegate) = self.shared.delegate() {
            for warning in &warnings {
                delegate.on_warning(warning);
            }
        }
        self.shared.notify_state(SessionState::Active);
        Ok(())
    }

    /// Stop the active session. Returns after capture and playback threads
    /// have quiesced and all session resources are released.
    pub fn stop_session(&self) -> Result<(), MixerError> {
        let (processing, monitor) = {
            let mut inner = self.shared.inner.lock();
            if !inner.state.is_active() {
                return Err(MixerError::InvalidState(format!(
                    "cannot stop a session while {}",
                    inner.state
                )));
            }
            Shared::transition(&mut inner, SessionState::Stopping);
            (inner.processing.take(), inner.monitor.take())
        };
        self.shared.notify_state(SessionState::Stopping);

        if let Some(monitor) = monitor {
            monitor.shutdown();
        }
        let diagnostics = processing.map(|mut processing| {
            processing.shutdown();
            processing.diagnostics()
        });

        {
            let mut inner = self.shared.inner.lock();
            if let Some(diagnostics) = diagnostics {
                inner.last_diagnostics = diagnostics;
            }
            Shared::transition(&mut inner, SessionState::Idle);
        }
        self.shared.notify_state(SessionState::Idle);
        Ok(())
    }

    /// Set microphone volume as a 0–100 percentage (clamped).
    pub fn set_microphone_volume(&self, percent: f64) -> Result<(), MixerError> {
        self.set_microphone_gain(percent_to_gain(percent))
    }

    pub fn set_microphone_gain(&self, gain: f32) -> Result<(), MixerError> {
        let inner = self.shared.inner.lock();
        self.shared.microphone_gain.set_gain(gain);
        if let Some(ref processing) = inner.processing {
            processing.set_microphone_gain(gain)?;
        }
        Ok(())
    }

    pub fn set_microphone_mute(&self, muted: bool) -> Result<(), MixerError> {
        let inner = self.shared.inner.lock();
        self.shared.microphone_gain.set_mute(muted);
        if let Some(ref processing) = inner.processing {
            processing.set_microphone_mute(muted)?;
        }
        Ok(())
    }

    /// Stored microphone gain (unaffected by mute).
    pub fn microphone_gain(&self) -> f32 {
        self.shared.microphone_gain.gain()
    }

    pub fn is_microphone_muted(&self) -> bool {
        self.shared.microphone_gain.is_muted()
    }

    /// Peak of the latest microphone block; 0.0 while muted or idle.
    pub fn microphone_level(&self) -> f32 {
        self.shared.microphone_level()
    }

    /// Counters of the running session, or of the last one once idle.
    pub fn diagnostics(&self) -> SessionDiagnostics {
        let inner = self.shared.inner.lock();
        match inner.processing {
            Some(ref processing) => processing.diagnostics(),
            None => inner.last_diagnostics.clone(),
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.diagnostics().warnings
    }
}

impl<B: DeviceBackend> Drop for MixerSession<B> {
    fn drop(&mut self) {
        if self.state().is_active() {
            let _ = self.stop_session();
        }
        let monitor = self.shared.inner.lock().monitor.take();
        if let Some(monitor) = monitor {
            monitor.shutdown();
        }
    }
}
