use std::fs;
use std::path::{Path, PathBuf};

use crate::models::config::MixerSettings;
use crate::models::error::MixerError;

const APP_DIR: &str = "AudioMixer";
const SETTINGS_FILE: &str = "settings.json";

/// JSON-file persistence for [`MixerSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/AudioMixer/settings.json`, e.g. `%APPDATA%\AudioMixer\settings.json`.
    pub fn default_location() -> Result<Self, MixerError> {
        let dir = dirs_next::config_dir()
            .ok_or_else(|| MixerError::StorageError("no configuration directory on this platform".into()))?;
        Ok(Self::new(dir.join(APP_DIR).join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings. A missing or unreadable file yields the defaults.
    pub fn load(&self) -> MixerSettings {
        match self.try_load() {
            Ok(Some(settings)) => settings,
            Ok(None) => MixerSettings::default(),
            Err(e) => {
                log::warn!("Ignoring settings at {}: {}", self.path.display(), e);
                MixerSettings::default()
            }
        }
    }

    fn try_load(&self) -> Result<Option<MixerSettings>, MixerError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)
            .map_err(|e| MixerError::StorageError(format!("failed to read settings: {}", e)))?;
        let settings = serde_json::from_str(&json)
            .map_err(|e| MixerError::StorageError(format!("failed to parse settings: {}", e)))?;
        Ok(Some(settings))
    }

    /// Write settings, creating the parent directory if needed.
    pub fn save(&self, settings: &MixerSettings) -> Result<(), MixerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| MixerError::StorageError(format!("failed to create settings directory: {}", e)))?;
        }
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| MixerError::StorageError(format!("failed to serialize settings: {}", e)))?;
        fs::write(&self.path, json)
            .map_err(|e| MixerError::StorageError(format!("failed to write settings: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (PathBuf, SettingsStore) {
        let dir = std::env::temp_dir().join(format!("audio-mixer-test-{}", uuid::Uuid::new_v4()));
        let store = SettingsStore::new(dir.join("nested").join(SETTINGS_FILE));
        (dir, store)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load(), MixerSettings::default());
    }

    #[test]
    fn save_then_load() {
        let (dir, store) = temp_store();
        let settings = MixerSettings {
            last_input_device_id: Some("{mic-1}".into()),
            last_output_device_id: Some("{spk-2}".into()),
            volume_percent: 42.0,
            mute_state: true,
            use_echo_cancellation: true,
        };

        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn file_uses_camel_case_keys() {
        let (dir, store) = temp_store();
        store.save(&MixerSettings::default()).unwrap();

        let json = fs::read_to_string(store.path()).unwrap();
        assert!(json.contains("\"volumePercent\": 75.0"));
        assert!(json.contains("\"muteState\": false"));
        assert!(json.contains("\"lastInputDeviceId\": null"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let (dir, store) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();

        assert_eq!(store.load(), MixerSettings::default());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn partial_file_fills_missing_keys() {
        let (dir, store) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), r#"{"muteState": true, "unknownKey": 3}"#).unwrap();

        let settings = store.load();
        assert!(settings.mute_state);
        assert_eq!(settings.volume_percent, 75.0);

        let _ = fs::remove_dir_all(dir);
    }
}
