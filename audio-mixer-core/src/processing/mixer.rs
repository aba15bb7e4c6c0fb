use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::InputId;
use crate::models::error::MixerError;
use crate::models::format::StreamDescriptor;
use crate::processing::gain::GainControl;
use crate::traits::sample_source::SampleSource;

/// One attached stream plus its gain/mute state.
pub struct MixerInput {
    id: InputId,
    source: Arc<dyn SampleSource>,
    gain: GainControl,
}

impl MixerInput {
    pub fn id(&self) -> InputId {
        self.id
    }

    pub fn gain(&self) -> &GainControl {
        &self.gain
    }
}

impl std::fmt::Debug for MixerInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixerInput")
            .field("id", &self.id)
            .field("format", &self.source.format())
            .field("gain", &self.gain)
            .finish()
    }
}

/// Sums N independently controlled inputs into one canonical-format stream.
///
/// The active input set is an immutable slice swapped atomically on
/// add/remove. Each `read` clones the current slice under a short lock and
/// mixes from that snapshot, so a concurrent add/remove never tears a block.
/// Output is the plain linear sum of `gain * sample`; nothing is clamped.
pub struct MixingEngine {
    format: StreamDescriptor,
    inputs: Mutex<Arc<[Arc<MixerInput>]>>,
    scratch: Mutex<Vec<f32>>,
    next_id: AtomicU64,
}

impl MixingEngine {
    /// Create an engine producing `format`, with scratch space for blocks of
    /// up to `max_block_frames`. Larger reads are mixed in chunks.
    pub fn new(format: StreamDescriptor, max_block_frames: usize) -> Self {
        let scratch_len = max_block_frames.max(1) * format.channels.max(1) as usize;
        Self {
            format,
            inputs: Mutex::new(Arc::from(Vec::new())),
            scratch: Mutex::new(vec![0.0; scratch_len]),
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach a stream. Its format must equal the engine's format exactly.
    pub fn add_input(&self, source: Arc<dyn SampleSource>, gain: f32) -> Result<InputId, MixerError> {
        let actual = source.format();
        if actual != self.format {
            return Err(MixerError::FormatMismatch {
                expected: self.format,
                actual,
            });
        }

        let id = InputId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let input = Arc::new(MixerInput {
            id,
            source,
            gain: GainControl::new(gain),
        });

        let mut inputs = self.inputs.lock();
        let mut next: Vec<Arc<MixerInput>> = inputs.iter().cloned().collect();
        next.push(input);
        *inputs = Arc::from(next);
        log::debug!("Mixer input {id} attached ({actual})");
        Ok(id)
    }

    /// Detach a stream. The source is not pulled by any read that starts
    /// after this returns.
    pub fn remove_input(&self, id: InputId) -> Result<(), MixerError> {
        let mut inputs = self.inputs.lock();
        if !inputs.iter().any(|input| input.id == id) {
            return Err(MixerError::UnknownInput(id));
        }
        let next: Vec<Arc<MixerInput>> = inputs.iter().filter(|input| input.id != id).cloned().collect();
        *inputs = Arc::from(next);
        log::debug!("Mixer input {id} detached");
        Ok(())
    }

    pub fn set_gain(&self, id: InputId, gain: f32) -> Result<(), MixerError> {
        self.input(id)?.gain.set_gain(gain);
        Ok(())
    }

    pub fn set_mute(&self, id: InputId, muted: bool) -> Result<(), MixerError> {
        self.input(id)?.gain.set_mute(muted);
        Ok(())
    }

    /// Stored gain of an input, regardless of mute state.
    pub fn gain(&self, id: InputId) -> Result<f32, MixerError> {
        Ok(self.input(id)?.gain.gain())
    }

    pub fn is_muted(&self, id: InputId) -> Result<bool, MixerError> {
        Ok(self.input(id)?.gain.is_muted())
    }

    pub fn input_count(&self) -> usize {
        self.inputs.lock().len()
    }

    pub fn input_ids(&self) -> Vec<InputId> {
        self.inputs.lock().iter().map(|input| input.id).collect()
    }

    fn input(&self, id: InputId) -> Result<Arc<MixerInput>, MixerError> {
        self.inputs
            .lock()
            .iter()
            .find(|input| input.id == id)
            .cloned()
            .ok_or(MixerError::UnknownInput(id))
    }

    fn snapshot(&self) -> Arc<[Arc<MixerInput>]> {
        self.inputs.lock().clone()
    }
}

impl SampleSource for MixingEngine {
    fn format(&self) -> StreamDescriptor {
        self.format
    }

    fn read(&self, out: &mut [f32]) {
        out.fill(0.0);
        let inputs = self.snapshot();
        if inputs.is_empty() {
            return;
        }

        let mut scratch = self.scratch.lock();
        let channels = self.format.channels.max(1) as usize;
        let chunk_len = scratch.len() - scratch.len() % channels;
        // A trailing partial frame stays silent.
        let whole = out.len() - out.len() % channels;

        for chunk in out[..whole].chunks_mut(chunk_len) {
            let block = &mut scratch[..chunk.len()];
            for input in inputs.iter() {
                // Muted inputs are still pulled so their bridges keep draining.
                input.source.read(block);
                let gain = input.gain.effective_gain();
                if gain == 0.0 {
                    continue;
                }
                for (acc, sample) in chunk.iter_mut().zip(block.iter()) {
                    *acc += gain * sample;
                }
            }
        }
    }
}

impl std::fmt::Debug for MixingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixingEngine")
            .field("format", &self.format)
            .field("inputs", &self.input_count())
            .finish()
    }
}
