//! Streaming sample-rate and channel-count conversion for Float32 streams.
//!
//! Rate conversion runs on rubato's FFT resampler in fixed output chunks of
//! 10 ms. Every buffer is sized at construction, so steady-state calls never
//! allocate. The filter delay is trimmed from the start of the stream, so
//! output frame `n` lines up with input time `n / output_rate`.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rubato::{FftFixedOut, Resampler as _};

use crate::models::error::MixerError;
use crate::models::format::{SampleEncoding, StreamDescriptor};
use crate::traits::sample_source::SampleSource;

const CHUNKS_PER_SECOND: u32 = 100;

/// The band-limited rate conversion stage and its pre-allocated buffers.
struct RateStage {
    engine: FftFixedOut<f32>,
    channels: usize,
    /// Planar input staging; the first `pending` frames are filled.
    input: Vec<Vec<f32>>,
    pending: usize,
    /// Planar output of the last chunk; frames `ready..produced` are unread.
    output: Vec<Vec<f32>>,
    ready: usize,
    produced: usize,
    /// Leading output frames still to discard.
    skip: usize,
    /// Interleaved upstream block for pull-mode reads.
    pulled: Vec<f32>,
    frames_in: u64,
    frames_out: u64,
}

impl RateStage {
    fn new(input: &StreamDescriptor, output: &StreamDescriptor) -> Result<Self, MixerError> {
        let channels = input.channels as usize;
        let chunk = (output.sample_rate / CHUNKS_PER_SECOND).max(1) as usize;
        let engine = FftFixedOut::<f32>::new(
            input.sample_rate as usize,
            output.sample_rate as usize,
            chunk,
            1,
            channels,
        )
        .map_err(|e| {
            MixerError::UnsupportedFormat(format!(
                "cannot convert {} Hz to {} Hz: {e}",
                input.sample_rate, output.sample_rate
            ))
        })?;

        Ok(Self {
            input: engine.input_buffer_allocate(true),
            output: engine.output_buffer_allocate(true),
            pulled: vec![0.0; engine.input_frames_max() * channels],
            skip: engine.output_delay(),
            engine,
            channels,
            pending: 0,
            ready: 0,
            produced: 0,
            frames_in: 0,
            frames_out: 0,
        })
    }

    /// Input frames still missing before the next chunk can be converted.
    fn wanted(&self) -> usize {
        self.engine.input_frames_next().saturating_sub(self.pending)
    }

    fn unread(&self) -> usize {
        self.produced - self.ready
    }

    /// Stage as many interleaved frames as the next chunk takes; returns the
    /// number of frames consumed.
    fn stage(&mut self, interleaved: &[f32]) -> usize {
        let frames = (interleaved.len() / self.channels).min(self.wanted());
        for (i, frame) in interleaved.chunks_exact(self.channels).take(frames).enumerate() {
            for (ch, sample) in frame.iter().enumerate() {
                self.input[ch][self.pending + i] = *sample;
            }
        }
        self.pending += frames;
        self.frames_in += frames as u64;
        frames
    }

    /// Pull the missing input for the next chunk from `pull`.
    fn stage_from(&mut self, pull: &mut impl FnMut(&mut [f32])) {
        let len = self.wanted() * self.channels;
        pull(&mut self.pulled[..len]);
        for (i, frame) in self.pulled[..len].chunks_exact(self.channels).enumerate() {
            for (ch, sample) in frame.iter().enumerate() {
                self.input[ch][self.pending + i] = *sample;
            }
        }
        self.pending += len / self.channels;
        self.frames_in += (len / self.channels) as u64;
    }

    /// Stage silence for the next chunk without counting it as input.
    fn stage_silence(&mut self) {
        let wanted = self.wanted();
        for channel in &mut self.input {
            channel[self.pending..self.pending + wanted].fill(0.0);
        }
        self.pending += wanted;
    }

    /// Convert the staged chunk. Returns `false` if the engine rejected it.
    fn convert(&mut self) -> bool {
        let result = self.engine.process_into_buffer(&self.input[..], &mut self.output[..], None);
        self.pending = 0;
        match result {
            Ok((_, produced)) => {
                let skipped = self.skip.min(produced);
                self.skip -= skipped;
                self.ready = skipped;
                self.produced = produced;
                true
            }
            Err(e) => {
                log::error!("Resampler chunk failed: {e}");
                self.ready = 0;
                self.produced = 0;
                false
            }
        }
    }

    /// Write the next `dst.len() / out_channels` unread frames into `dst`.
    fn emit(&mut self, dst: &mut [f32], out_channels: usize) {
        let mut frame = [0.0f32; 2];
        for dst_frame in dst.chunks_exact_mut(out_channels) {
            for (ch, sample) in frame[..self.channels].iter_mut().enumerate() {
                *sample = self.output[ch][self.ready];
            }
            map_channels(&frame[..self.channels], dst_frame);
            self.ready += 1;
            self.frames_out += 1;
        }
    }

    fn reset(&mut self) {
        self.engine.reset();
        self.pending = 0;
        self.ready = 0;
        self.produced = 0;
        self.skip = self.engine.output_delay();
        self.frames_in = 0;
        self.frames_out = 0;
    }
}

/// Rate + channel converter between two Float32 formats.
///
/// Supports any rate pair and the channel layouts 1→1, 2→2, 1→2
/// (duplicate) and 2→1 (average). Rate conversion happens first, channel
/// conversion is applied to each converted frame.
pub struct Resampler {
    input: StreamDescriptor,
    output: StreamDescriptor,
    /// `None` when the rates match.
    rate: Option<RateStage>,
    /// Same-rate channel conversion buffer for pull-mode reads.
    scratch: Vec<f32>,
}

impl fmt::Debug for Resampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resampler")
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl Resampler {
    /// Build a converter. Allocates; call outside the audio thread.
    pub fn new(input: StreamDescriptor, output: StreamDescriptor) -> Result<Self, MixerError> {
        for format in [&input, &output] {
            if format.encoding != SampleEncoding::Float32 {
                return Err(MixerError::UnsupportedFormat(format!(
                    "resampler expects Float32 streams, got {format}"
                )));
            }
            if format.sample_rate == 0 {
                return Err(MixerError::UnsupportedFormat(format!("zero sample rate in {format}")));
            }
        }
        match (input.channels, output.channels) {
            (1, 1) | (2, 2) | (1, 2) | (2, 1) => {}
            (from, to) => return Err(MixerError::UnsupportedChannelLayout { from, to }),
        }

        let rate = if input.sample_rate == output.sample_rate {
            None
        } else {
            Some(RateStage::new(&input, &output)?)
        };
        Ok(Self {
            input,
            output,
            rate,
            scratch: Vec::new(),
        })
    }

    /// Pre-size internal buffers for output blocks of up to `frames` frames.
    pub fn with_block_capacity(mut self, frames: usize) -> Self {
        if self.rate.is_none() && !self.is_passthrough() {
            self.scratch.reserve(frames * self.input.channels as usize);
        }
        self
    }

    pub fn input_format(&self) -> StreamDescriptor {
        self.input
    }

    pub fn output_format(&self) -> StreamDescriptor {
        self.output
    }

    /// Whether input and output formats are identical.
    pub fn is_passthrough(&self) -> bool {
        self.input == self.output
    }

    /// Push-style conversion: consume all of `input`, replace `out` with every
    /// output frame that can be produced so far.
    ///
    /// Rate conversion holds back up to one chunk plus the filter delay;
    /// [`Resampler::flush`] releases it at the end of a stream.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        out.clear();
        let ch_in = self.input.channels as usize;
        let ch_out = self.output.channels as usize;

        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }

        let mut input = &input[..input.len() - input.len() % ch_in];
        let Some(ref mut rate) = self.rate else {
            out.resize(input.len() / ch_in * ch_out, 0.0);
            for (src, dst) in input.chunks_exact(ch_in).zip(out.chunks_exact_mut(ch_out)) {
                map_channels(src, dst);
            }
            return;
        };

        loop {
            let unread = rate.unread();
            if unread > 0 {
                let start = out.len();
                out.resize(start + unread * ch_out, 0.0);
                rate.emit(&mut out[start..], ch_out);
            }
            if input.is_empty() {
                break;
            }
            let consumed = rate.stage(input);
            input = &input[consumed * ch_in..];
            if rate.wanted() == 0 && !rate.convert() {
                break;
            }
        }

        assert_eq!(out.len() % ch_out, 0, "resampler produced a partial frame");
    }

    /// End of stream: replace `out` with the held-back output, so the stream
    /// totals `input_frames × output_rate / input_rate` frames (rounded down).
    /// The converter is reset afterwards.
    pub fn flush(&mut self, out: &mut Vec<f32>) {
        out.clear();
        let ch_out = self.output.channels as usize;
        let rate_in = self.input.sample_rate as u64;
        let rate_out = self.output.sample_rate as u64;
        let Some(ref mut rate) = self.rate else {
            return;
        };

        let total = rate.frames_in * rate_out / rate_in;
        while rate.frames_out < total {
            if rate.unread() == 0 {
                rate.stage_silence();
                if !rate.convert() {
                    break;
                }
                continue;
            }
            let frames = (rate.unread() as u64).min(total - rate.frames_out) as usize;
            let start = out.len();
            out.resize(start + frames * ch_out, 0.0);
            rate.emit(&mut out[start..], ch_out);
        }
        rate.reset();
    }

    /// Pull-style conversion: fill `out` completely, pulling input from
    /// `pull` as needed. `pull` must fill its slice.
    ///
    /// A trailing partial frame in `out` is zeroed.
    pub fn fill(&mut self, out: &mut [f32], mut pull: impl FnMut(&mut [f32])) {
        let ch_in = self.input.channels as usize;
        let ch_out = self.output.channels as usize;
        let frames = out.len() / ch_out;
        let (out, tail) = out.split_at_mut(frames * ch_out);
        tail.fill(0.0);

        if self.is_passthrough() {
            pull(out);
            return;
        }

        let Some(ref mut rate) = self.rate else {
            self.scratch.clear();
            self.scratch.resize(frames * ch_in, 0.0);
            pull(&mut self.scratch);
            for (src, dst) in self.scratch.chunks_exact(ch_in).zip(out.chunks_exact_mut(ch_out)) {
                map_channels(src, dst);
            }
            return;
        };

        let mut written = 0;
        while written < frames {
            if rate.unread() == 0 {
                rate.stage_from(&mut pull);
                if !rate.convert() {
                    out[written * ch_out..].fill(0.0);
                    return;
                }
                continue;
            }
            let n = rate.unread().min(frames - written);
            rate.emit(&mut out[written * ch_out..(written + n) * ch_out], ch_out);
            written += n;
        }
    }

    /// Drop any retained input and restart the stream.
    pub fn reset(&mut self) {
        if let Some(ref mut rate) = self.rate {
            rate.reset();
        }
        self.scratch.clear();
    }
}

/// Copy one frame between channel layouts: mono→stereo duplicates,
/// stereo→mono averages, equal layouts copy.
fn map_channels(src: &[f32], dst: &mut [f32]) {
    match (src.len(), dst.len()) {
        (1, 2) => {
            dst[0] = src[0];
            dst[1] = src[0];
        }
        (2, 1) => dst[0] = (src[0] + src[1]) * 0.5,
        _ => dst.copy_from_slice(src),
    }
}

/// A [`SampleSource`] adapter that converts another source to a target format.
///
/// Pulls upstream samples one resampler chunk at a time; identical formats
/// pass straight through.
pub struct ResampledSource {
    inner: Arc<dyn SampleSource>,
    resampler: Mutex<Resampler>,
    output: StreamDescriptor,
}

impl ResampledSource {
    pub fn new(
        inner: Arc<dyn SampleSource>,
        target: StreamDescriptor,
        max_block_frames: usize,
    ) -> Result<Self, MixerError> {
        let resampler = Resampler::new(inner.format(), target)?.with_block_capacity(max_block_frames);
        assert_eq!(
            resampler.output_format(),
            target,
            "resampler output must equal the requested target"
        );
        Ok(Self {
            inner,
            resampler: Mutex::new(resampler),
            output: target,
        })
    }
}

impl SampleSource for ResampledSource {
    fn format(&self) -> StreamDescriptor {
        self.output
    }

    fn read(&self, out: &mut [f32]) {
        let inner = &self.inner;
        self.resampler.lock().fill(out, |buf| inner.read(buf));
    }
}
