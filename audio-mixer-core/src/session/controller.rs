use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioDevice, SessionDiagnostics};
use crate::models::config::{MixerSettings, SessionConfiguration};
use crate::models::error::MixerError;
use crate::models::state::SessionState;
use crate::session::mixer_session::MixerSession;
use crate::storage::settings::SettingsStore;
use crate::traits::device_backend::DeviceBackend;
use crate::traits::session_delegate::SessionDelegate;

/// Pick the remembered device if it is still present, else the default,
/// else the first enumerated device.
pub fn select_device(devices: &[AudioDevice], remembered: Option<&str>, default: Option<AudioDevice>) -> Option<AudioDevice> {
    if let Some(id) = remembered {
        if let Some(device) = devices.iter().find(|d| d.id == id) {
            return Some(device.clone());
        }
        log::info!("Remembered device {id} is no longer available; falling back to default");
    }
    default.or_else(|| devices.first().cloned())
}

struct Selection {
    settings: MixerSettings,
    input: Option<AudioDevice>,
    output: Option<AudioDevice>,
}

/// Settings-backed front end for a [`MixerSession`].
///
/// Restores the last device selection, volume and mute on construction and
/// persists every user-visible change. Persistence failures are logged and
/// never interrupt audio.
pub struct MixerController<B: DeviceBackend> {
    session: MixerSession<B>,
    store: SettingsStore,
    selection: Mutex<Selection>,
}

impl<B: DeviceBackend> MixerController<B> {
    pub fn new(backend: B, config: SessionConfiguration, store: SettingsStore) -> Result<Self, MixerError> {
        let settings = store.load();
        let session = MixerSession::new(backend, config)?;
        session.set_microphone_volume(settings.volume_percent)?;
        session.set_microphone_mute(settings.mute_state)?;

        let backend = session.backend();
        let input = select_device(
            &backend.input_devices()?,
            settings.last_input_device_id.as_deref(),
            backend.default_input_device(),
        );
        let output = select_device(
            &backend.output_devices()?,
            settings.last_output_device_id.as_deref(),
            backend.default_output_device(),
        );
        log::info!(
            "Selected input {:?}, output {:?}",
            input.as_ref().map(|d| d.name.as_str()),
            output.as_ref().map(|d| d.name.as_str())
        );

        Ok(Self {
            session,
            store,
            selection: Mutex::new(Selection { settings, input, output }),
        })
    }

    pub fn session(&self) -> &MixerSession<B> {
        &self.session
    }

    pub fn set_delegate(&self, delegate: Arc<dyn SessionDelegate>) {
        self.session.set_delegate(delegate);
    }

    pub fn settings(&self) -> MixerSettings {
        self.selection.lock().settings.clone()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn input_devices(&self) -> Result<Vec<AudioDevice>, MixerError> {
        self.session.backend().input_devices()
    }

    pub fn output_devices(&self) -> Result<Vec<AudioDevice>, MixerError> {
        self.session.backend().output_devices()
    }

    pub fn selected_input(&self) -> Option<AudioDevice> {
        self.selection.lock().input.clone()
    }

    pub fn selected_output(&self) -> Option<AudioDevice> {
        self.selection.lock().output.clone()
    }

    /// Select the microphone. An active session restarts on the new device.
    pub fn select_input_device(&self, device_id: &str) -> Result<(), MixerError> {
        let device = self
            .input_devices()?
            .into_iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| MixerError::DeviceNotFound(device_id.to_string()))?;
        self.update(|selection| {
            selection.settings.last_input_device_id = Some(device.id.clone());
            selection.input = Some(device);
        });
        self.restart_if_active()
    }

    /// Select the playback device. An active session restarts on the new device.
    pub fn select_output_device(&self, device_id: &str) -> Result<(), MixerError> {
        let device = self
            .output_devices()?
            .into_iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| MixerError::DeviceNotFound(device_id.to_string()))?;
        self.update(|selection| {
            selection.settings.last_output_device_id = Some(device.id.clone());
            selection.output = Some(device);
        });
        self.restart_if_active()
    }

    pub fn set_microphone_volume(&self, percent: f64) -> Result<(), MixerError> {
        let percent = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
        self.session.set_microphone_volume(percent)?;
        self.update(|selection| selection.settings.volume_percent = percent);
        Ok(())
    }

    pub fn set_microphone_mute(&self, muted: bool) -> Result<(), MixerError> {
        self.session.set_microphone_mute(muted)?;
        // Unmuting from zero volume restores full volume; keep the setting in step.
        let gain = self.session.microphone_gain();
        self.update(|selection| {
            selection.settings.mute_state = muted;
            if (selection.settings.microphone_gain() - gain).abs() > f32::EPSILON {
                selection.settings.volume_percent = f64::from(gain) * 100.0;
            }
        });
        Ok(())
    }

    /// Applies from the next session start.
    pub fn set_echo_cancellation(&self, enabled: bool) {
        self.update(|selection| selection.settings.use_echo_cancellation = enabled);
    }

    /// Start a session with the current selection and settings.
    pub fn start(&self) -> Result<(), MixerError> {
        let (input, output, use_echo_cancellation) = {
            let selection = self.selection.lock();
            let input = selection
                .input
                .clone()
                .ok_or_else(|| MixerError::DeviceNotFound("no input device selected".into()))?;
            let output = selection
                .output
                .clone()
                .ok_or_else(|| MixerError::DeviceNotFound("no output device selected".into()))?;
            (input, output, selection.settings.use_echo_cancellation)
        };
        self.session.start_session(&input.id, &output.id, use_echo_cancellation)
    }

    pub fn stop(&self) -> Result<(), MixerError> {
        self.session.stop_session()
    }

    /// Start when idle, stop when active.
    pub fn toggle(&self) -> Result<(), MixerError> {
        if self.session.state().is_active() {
            self.stop()
        } else {
            self.start()
        }
    }

    pub fn microphone_level(&self) -> f32 {
        self.session.microphone_level()
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.session.diagnostics()
    }

    /// Stop any active session and persist settings one last time.
    pub fn shutdown(&self) {
        if self.session.state().is_active() {
            if let Err(e) = self.session.stop_session() {
                log::warn!("Failed to stop session during shutdown: {e}");
            }
        }
        self.persist(&self.settings());
    }

    fn restart_if_active(&self) -> Result<(), MixerError> {
        if !self.session.state().is_active() {
            return Ok(());
        }
        log::info!("Device selection changed; restarting session");
        self.session.stop_session()?;
        self.start()
    }

    fn update(&self, change: impl FnOnce(&mut Selection)) {
        let settings = {
            let mut selection = self.selection.lock();
            change(&mut selection);
            selection.settings.clone()
        };
        self.persist(&settings);
    }

    fn persist(&self, settings: &MixerSettings) {
        if let Err(e) = self.store.save(settings) {
            log::warn!("Failed to save settings: {e}");
        }
    }
}
