//! Echo-cancellation stage between the microphone bridge and the mixer.
//!
//! The adapter pulls the microphone and the reference (system audio) in
//! lockstep and hands both blocks to an [`EchoStrategy`]. The strategy is a
//! plug-in point; [`DuckingStrategy`] is the default and [`PassThrough`]
//! leaves the microphone untouched.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::DuckingConfig;
use crate::models::error::MixerError;
use crate::models::format::StreamDescriptor;
use crate::processing::levels::rms_level;
use crate::traits::echo_strategy::EchoStrategy;
use crate::traits::sample_source::SampleSource;

struct AdapterState {
    strategy: Box<dyn EchoStrategy>,
    reference_block: Vec<f32>,
}

/// A single de-echoed microphone stream built from a microphone and a
/// reference stream of identical format.
pub struct EchoCancellationAdapter {
    mic: Arc<dyn SampleSource>,
    reference: Arc<dyn SampleSource>,
    format: StreamDescriptor,
    state: Mutex<AdapterState>,
}

impl EchoCancellationAdapter {
    /// Combine `mic` and `reference`.
    ///
    /// Fails with `IncompatibleReferenceFormat` unless sample rate, channel
    /// count and encoding of both streams are identical. Callers fall back to
    /// the raw microphone in that case.
    pub fn attach(
        mic: Arc<dyn SampleSource>,
        reference: Arc<dyn SampleSource>,
        strategy: Box<dyn EchoStrategy>,
        max_block_frames: usize,
    ) -> Result<Self, MixerError> {
        let mic_format = mic.format();
        let reference_format = reference.format();
        if mic_format != reference_format {
            return Err(MixerError::IncompatibleReferenceFormat {
                mic: mic_format,
                reference: reference_format,
            });
        }

        let block = max_block_frames.max(1) * mic_format.channels.max(1) as usize;
        Ok(Self {
            mic,
            reference,
            format: mic_format,
            state: Mutex::new(AdapterState {
                strategy,
                reference_block: vec![0.0; block],
            }),
        })
    }

    /// Drop the strategy's adaptive state.
    pub fn reset(&self) {
        self.state.lock().strategy.reset();
    }
}

impl SampleSource for EchoCancellationAdapter {
    fn format(&self) -> StreamDescriptor {
        self.format
    }

    fn read(&self, out: &mut [f32]) {
        let channels = self.format.channels.max(1) as usize;
        let mut state = self.state.lock();
        let AdapterState {
            strategy,
            reference_block,
        } = &mut *state;
        let chunk_len = reference_block.len() - reference_block.len() % channels;

        for mic_chunk in out.chunks_mut(chunk_len) {
            let reference = &mut reference_block[..mic_chunk.len()];
            self.mic.read(mic_chunk);
            self.reference.read(reference);
            strategy.process(mic_chunk, reference, channels);
        }
    }
}

impl std::fmt::Debug for EchoCancellationAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoCancellationAdapter")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Leaves the microphone unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl EchoStrategy for PassThrough {
    fn process(&mut self, _mic: &mut [f32], _reference: &[f32], _channels: usize) {}
}

/// Ducks the microphone while the reference carries signal.
///
/// Each block's reference RMS is compared with the threshold; the applied gain
/// moves toward `ducked_gain` (attack) or back to 1.0 (release) once per
/// block, ramped linearly across the block to avoid zipper noise.
#[derive(Debug, Clone)]
pub struct DuckingStrategy {
    config: DuckingConfig,
    current_gain: f32,
}

impl DuckingStrategy {
    pub fn new(config: DuckingConfig) -> Self {
        Self {
            config,
            current_gain: 1.0,
        }
    }

    pub fn current_gain(&self) -> f32 {
        self.current_gain
    }
}

impl Default for DuckingStrategy {
    fn default() -> Self {
        Self::new(DuckingConfig::default())
    }
}

impl EchoStrategy for DuckingStrategy {
    fn process(&mut self, mic: &mut [f32], reference: &[f32], channels: usize) {
        let channels = channels.max(1);
        let frames = mic.len() / channels;
        if frames == 0 {
            return;
        }

        let active = rms_level(reference) > self.config.threshold;
        let (target, coefficient) = if active {
            (self.config.ducked_gain, self.config.attack)
        } else {
            (1.0, self.config.release)
        };

        let start = self.current_gain;
        let end = start + (target - start) * coefficient.clamp(0.0, 1.0);
        let step = (end - start) / frames as f32;

        for (i, frame) in mic.chunks_exact_mut(channels).enumerate() {
            let gain = start + step * (i + 1) as f32;
            for sample in frame {
                *sample *= gain;
            }
        }
        self.current_gain = end;
    }

    fn reset(&mut self) {
        self.current_gain = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Constant(StreamDescriptor, f32);

    impl SampleSource for Constant {
        fn format(&self) -> StreamDescriptor {
            self.0
        }

        fn read(&self, out: &mut [f32]) {
            out.fill(self.1);
        }
    }

    fn constant(format: StreamDescriptor, value: f32) -> Arc<dyn SampleSource> {
        Arc::new(Constant(format, value))
    }

    #[test]
    fn mismatched_formats_are_rejected() {
        let mic = constant(StreamDescriptor::float32(16_000, 1), 0.5);
        let system = constant(StreamDescriptor::float32(48_000, 2), 0.5);

        let err = EchoCancellationAdapter::attach(mic, system, Box::new(PassThrough), 480).unwrap_err();
        assert!(matches!(err, MixerError::IncompatibleReferenceFormat { .. }));
    }

    #[test]
    fn rate_only_mismatch_is_rejected() {
        let mic = constant(StreamDescriptor::float32(44_100, 2), 0.5);
        let system = constant(StreamDescriptor::float32(48_000, 2), 0.5);
        assert!(EchoCancellationAdapter::attach(mic, system, Box::new(PassThrough), 480).is_err());
    }

    #[test]
    fn pass_through_emits_microphone() {
        let format = StreamDescriptor::float32(48_000, 2);
        let adapter =
            EchoCancellationAdapter::attach(constant(format, 0.5), constant(format, 0.9), Box::new(PassThrough), 8)
                .unwrap();

        assert_eq!(adapter.format(), format);
        let mut out = vec![0.0f32; 100];
        adapter.read(&mut out);
        assert!(out.iter().all(|s| *s == 0.5));
    }

    #[test]
    fn ducking_attenuates_while_reference_is_loud() {
        let format = StreamDescriptor::float32(48_000, 1);
        let config = DuckingConfig {
            attack: 1.0,
            ..DuckingConfig::default()
        };
        let adapter = EchoCancellationAdapter::attach(
            constant(format, 1.0),
            constant(format, 0.5),
            Box::new(DuckingStrategy::new(config)),
            480,
        )
        .unwrap();

        let mut out = vec![0.0f32; 480];
        adapter.read(&mut out);
        assert_relative_eq!(out[479], config.ducked_gain, epsilon = 1e-5);
        adapter.read(&mut out);
        assert!(out.iter().all(|s| (s - config.ducked_gain).abs() < 1e-5));
    }

    #[test]
    fn ducking_leaves_quiet_reference_alone() {
        let mut strategy = DuckingStrategy::default();
        let mut mic = vec![0.5f32; 96];
        strategy.process(&mut mic, &[0.0; 96], 2);
        assert!(mic.iter().all(|s| *s == 0.5));
        assert_relative_eq!(strategy.current_gain(), 1.0);
    }

    #[test]
    fn ducking_releases_after_reference_stops() {
        let mut strategy = DuckingStrategy::new(DuckingConfig {
            attack: 1.0,
            release: 0.5,
            ..DuckingConfig::default()
        });
        let mut mic = vec![1.0f32; 64];
        strategy.process(&mut mic, &[0.5; 64], 1);
        let ducked = strategy.current_gain();

        let mut mic = vec![1.0f32; 64];
        strategy.process(&mut mic, &[0.0; 64], 1);
        assert!(strategy.current_gain() > ducked);
        assert!(strategy.current_gain() < 1.0);

        strategy.reset();
        assert_relative_eq!(strategy.current_gain(), 1.0);
    }
}
