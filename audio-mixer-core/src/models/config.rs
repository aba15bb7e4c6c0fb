use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::MixerError;
use super::format::{SampleEncoding, StreamDescriptor, CANONICAL_FORMAT};

/// Parameters of the ducking echo strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuckingConfig {
    /// Reference RMS above which the microphone is ducked.
    pub threshold: f32,
    /// Linear gain applied to the microphone while ducked.
    pub ducked_gain: f32,
    /// Per-block smoothing toward the ducked gain (0.0–1.0, 1.0 = instant).
    pub attack: f32,
    /// Per-block smoothing back to unity (0.0–1.0, 1.0 = instant).
    pub release: f32,
}

impl Default for DuckingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            ducked_gain: 0.3,
            attack: 0.5,
            release: 0.1,
        }
    }
}

/// Engine-side configuration for processing sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfiguration {
    /// Mixing engine output format (default: 48 kHz, stereo, Float32).
    pub canonical_format: StreamDescriptor,

    /// Capacity of each push-to-pull bridge (default: 100 ms).
    pub bridge_capacity: Duration,

    /// Drop the oldest samples when a bridge overflows (default: true).
    pub discard_on_overflow: bool,

    /// Interval of microphone peak-level notifications (default: 100 ms).
    pub level_interval: Duration,

    /// Largest output block, in frames, that scratch buffers are pre-sized for.
    pub max_block_frames: usize,

    pub ducking: DuckingConfig,
}

impl SessionConfiguration {
    pub fn validate(&self) -> Result<(), MixerError> {
        let format = &self.canonical_format;
        if format.sample_rate == 0 {
            return Err(MixerError::InvalidConfiguration("sample rate must be positive".into()));
        }
        if ![1, 2].contains(&format.channels) {
            return Err(MixerError::InvalidConfiguration(format!(
                "unsupported canonical channel count: {}",
                format.channels
            )));
        }
        if format.encoding != SampleEncoding::Float32 {
            return Err(MixerError::InvalidConfiguration(format!(
                "canonical encoding must be Float32, got {}",
                format.encoding
            )));
        }
        if self.bridge_capacity.is_zero() {
            return Err(MixerError::InvalidConfiguration("bridge capacity must be positive".into()));
        }
        if self.level_interval.is_zero() {
            return Err(MixerError::InvalidConfiguration("level interval must be positive".into()));
        }
        if self.max_block_frames == 0 {
            return Err(MixerError::InvalidConfiguration("max block size must be positive".into()));
        }
        Ok(())
    }

    /// Interleaved sample capacity of a bridge carrying `format`.
    pub fn bridge_samples(&self, format: &StreamDescriptor) -> usize {
        let millis = self.bridge_capacity.as_millis() as u64;
        format.samples_for_millis(millis).max(format.channels as usize)
    }
}

impl Default for SessionConfiguration {
    fn default() -> Self {
        Self {
            canonical_format: CANONICAL_FORMAT,
            bridge_capacity: Duration::from_millis(100),
            discard_on_overflow: true,
            level_interval: Duration::from_millis(100),
            max_block_frames: 4_800,
            ducking: DuckingConfig::default(),
        }
    }
}

/// User-facing settings persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MixerSettings {
    pub last_input_device_id: Option<String>,
    pub last_output_device_id: Option<String>,
    pub volume_percent: f64,
    pub mute_state: bool,
    pub use_echo_cancellation: bool,
}

impl MixerSettings {
    /// Microphone gain derived from `volume_percent`, clamped to 0–100 %.
    pub fn microphone_gain(&self) -> f32 {
        percent_to_gain(self.volume_percent)
    }
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            last_input_device_id: None,
            last_output_device_id: None,
            volume_percent: 75.0,
            mute_state: false,
            use_echo_cancellation: false,
        }
    }
}

/// Map a 0–100 volume percentage to linear gain.
pub fn percent_to_gain(percent: f64) -> f32 {
    if percent.is_nan() {
        return 0.0;
    }
    (percent.clamp(0.0, 100.0) / 100.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        assert!(SessionConfiguration::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_float_canonical_format() {
        let config = SessionConfiguration {
            canonical_format: StreamDescriptor::new(48_000, 2, SampleEncoding::Pcm16),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MixerError::InvalidConfiguration(_))));
    }

    #[test]
    fn rejects_surround_canonical_format() {
        let config = SessionConfiguration {
            canonical_format: StreamDescriptor::float32(48_000, 6),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bridge_samples_follow_capacity() {
        let config = SessionConfiguration::default();
        assert_eq!(config.bridge_samples(&StreamDescriptor::float32(48_000, 2)), 9_600);
        assert_eq!(config.bridge_samples(&StreamDescriptor::float32(16_000, 1)), 1_600);
    }

    #[test]
    fn percent_mapping_clamps() {
        assert_eq!(percent_to_gain(75.0), 0.75);
        assert_eq!(percent_to_gain(150.0), 1.0);
        assert_eq!(percent_to_gain(-5.0), 0.0);
        assert_eq!(percent_to_gain(f64::NAN), 0.0);
    }

    #[test]
    fn settings_defaults() {
        let settings = MixerSettings::default();
        assert_eq!(settings.volume_percent, 75.0);
        assert!(!settings.mute_state);
        assert!(!settings.use_echo_cancellation);
        assert_eq!(settings.microphone_gain(), 0.75);
    }
}
