//! Settings-backed controller flow against the in-memory backend.

mod common;

use std::fs;
use std::path::PathBuf;

use audio_mixer_core::{
    MixerController, MixerError, MixerSettings, SampleEncoding, SessionConfiguration, SessionState, SettingsStore,
    StreamDescriptor,
};
use common::{constant, Loopback, MockBackend, CABLE_ID, HEADSET_ID, MIC_ID, SPEAKERS_ID};

struct TempSettings {
    dir: PathBuf,
    store: SettingsStore,
}

impl TempSettings {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("audio-mixer-controller-{}", uuid::Uuid::new_v4()));
        let store = SettingsStore::new(dir.join("settings.json"));
        Self { dir, store }
    }

    fn with(settings: &MixerSettings) -> Self {
        let temp = Self::new();
        temp.store.save(settings).unwrap();
        temp
    }

    fn saved(&self) -> MixerSettings {
        self.store.load()
    }
}

impl Drop for TempSettings {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

fn backend() -> MockBackend {
    MockBackend::new(
        StreamDescriptor::new(48_000, 2, SampleEncoding::Pcm16),
        Loopback::OpenFails,
    )
}

#[test]
fn defaults_select_default_devices() {
    let temp = TempSettings::new();
    let controller = MixerController::new(backend(), SessionConfiguration::default(), temp.store.clone()).unwrap();

    assert_eq!(controller.selected_input().unwrap().id, MIC_ID);
    assert_eq!(controller.selected_output().unwrap().id, SPEAKERS_ID);
    assert_eq!(controller.settings(), MixerSettings::default());
    assert_eq!(controller.session().microphone_gain(), 0.75);
}

#[test]
fn remembered_devices_and_levels_are_restored() {
    let temp = TempSettings::with(&MixerSettings {
        last_input_device_id: Some(HEADSET_ID.into()),
        last_output_device_id: Some("{unplugged}".into()),
        volume_percent: 40.0,
        mute_state: true,
        use_echo_cancellation: false,
    });
    let controller = MixerController::new(backend(), SessionConfiguration::default(), temp.store.clone()).unwrap();

    assert_eq!(controller.selected_input().unwrap().id, HEADSET_ID);
    assert_eq!(controller.selected_output().unwrap().id, SPEAKERS_ID);
    assert_eq!(controller.session().microphone_gain(), 0.4);
    assert!(controller.session().is_microphone_muted());
}

#[test]
fn every_change_is_persisted() {
    let temp = TempSettings::new();
    let controller = MixerController::new(backend(), SessionConfiguration::default(), temp.store.clone()).unwrap();

    controller.set_microphone_volume(150.0).unwrap();
    assert_eq!(temp.saved().volume_percent, 100.0);
    assert_eq!(controller.session().microphone_gain(), 1.0);

    controller.set_microphone_mute(true).unwrap();
    assert!(temp.saved().mute_state);

    controller.set_echo_cancellation(true);
    assert!(temp.saved().use_echo_cancellation);

    controller.select_input_device(HEADSET_ID).unwrap();
    controller.select_output_device(CABLE_ID).unwrap();
    let saved = temp.saved();
    assert_eq!(saved.last_input_device_id.as_deref(), Some(HEADSET_ID));
    assert_eq!(saved.last_output_device_id.as_deref(), Some(CABLE_ID));
}

#[test]
fn unmute_from_zero_volume_persists_full_volume() {
    let temp = TempSettings::new();
    let controller = MixerController::new(backend(), SessionConfiguration::default(), temp.store.clone()).unwrap();

    controller.set_microphone_volume(0.0).unwrap();
    controller.set_microphone_mute(true).unwrap();
    controller.set_microphone_mute(false).unwrap();

    let saved = temp.saved();
    assert!(!saved.mute_state);
    assert_eq!(saved.volume_percent, 100.0);
}

#[test]
fn unknown_device_selection_is_rejected() {
    let temp = TempSettings::new();
    let controller = MixerController::new(backend(), SessionConfiguration::default(), temp.store.clone()).unwrap();

    assert_eq!(
        controller.select_input_device("{ghost}"),
        Err(MixerError::DeviceNotFound("{ghost}".into()))
    );
    assert_eq!(controller.selected_input().unwrap().id, MIC_ID);
}

#[test]
fn start_uses_selection_and_restarts_on_device_change() {
    let temp = TempSettings::new();
    let backend = backend();
    let handles = backend.handles();
    let controller = MixerController::new(backend, SessionConfiguration::default(), temp.store.clone()).unwrap();

    controller.toggle().unwrap();
    assert_eq!(controller.state(), SessionState::Active);
    assert_eq!(handles.output().device_id, SPEAKERS_ID);

    // 75 % default volume applies to the running session.
    handles.microphone().push_samples(&constant(480, 2, 0.5));
    let out = handles.output().pull(480).unwrap();
    assert!(out.iter().all(|s| *s == 0.375));

    let first_output = handles.output();
    controller.select_output_device(CABLE_ID).unwrap();
    assert_eq!(controller.state(), SessionState::Active);
    assert!(first_output.was_stopped());
    assert_eq!(handles.output().device_id, CABLE_ID);

    controller.toggle().unwrap();
    assert_eq!(controller.state(), SessionState::Idle);
}

#[test]
fn shutdown_stops_and_saves() {
    let temp = TempSettings::new();
    let backend = backend();
    let handles = backend.handles();
    let controller = MixerController::new(backend, SessionConfiguration::default(), temp.store.clone()).unwrap();

    controller.start().unwrap();
    controller.shutdown();

    assert_eq!(controller.state(), SessionState::Idle);
    assert!(handles.output().was_stopped());
    assert!(temp.store.path().exists());
}
