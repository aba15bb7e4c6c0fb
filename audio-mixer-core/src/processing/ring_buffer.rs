/// Bounded circular buffer of interleaved audio samples.
///
/// Wrap in `parking_lot::Mutex` for cross-thread access (see `PushPullBridge`).
/// Every write and every drop moves whole frames, so channel alignment is
/// preserved as long as callers read whole frames too.
#[derive(Debug)]
pub struct RingBuffer {
    buffer: Vec<f32>,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
    frame_size: usize,
}

/// What a single [`RingBuffer::write`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    /// Samples stored from this write.
    pub written: usize,
    /// Samples lost to make room (oldest unread ones when discarding, or the
    /// rejected tail of this write when not).
    pub dropped: usize,
}

impl RingBuffer {
    /// Create a buffer holding up to `capacity` samples, rounded down to whole
    /// frames of `frame_size` samples (at least one frame).
    pub fn new(capacity: usize, frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        let capacity = (capacity - capacity % frame_size).max(frame_size);
        Self {
            buffer: vec![0.0; capacity],
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
            frame_size,
        }
    }

    /// Write samples into the ring buffer.
    ///
    /// With `discard_on_overflow`, the oldest unread samples are dropped to
    /// make room and a write larger than capacity keeps only its newest
    /// samples. Without it, the write cursor never laps the read cursor:
    /// whatever does not fit is rejected.
    pub fn write(&mut self, samples: &[f32], discard_on_overflow: bool) -> WriteOutcome {
        let samples = &samples[..samples.len() - samples.len() % self.frame_size];
        if samples.is_empty() {
            return WriteOutcome::default();
        }

        let mut dropped = 0;
        let samples = if discard_on_overflow {
            // If more data than capacity, only keep the tail
            let samples = if samples.len() > self.capacity {
                dropped += samples.len() - self.capacity;
                &samples[samples.len() - self.capacity..]
            } else {
                samples
            };

            // Drop oldest if we'd overflow
            let overflow = (self.available + samples.len()).saturating_sub(self.capacity);
            if overflow > 0 {
                self.read_index = (self.read_index + overflow) % self.capacity;
                self.available -= overflow;
                dropped += overflow;
            }
            samples
        } else {
            let free = self.capacity - self.available;
            let accepted = samples.len().min(free);
            dropped += samples.len() - accepted;
            &samples[..accepted]
        };

        self.copy_in(samples);
        WriteOutcome {
            written: samples.len(),
            dropped,
        }
    }

    /// Move up to `out.len()` samples into `out`, oldest first.
    ///
    /// Returns the number of samples copied; the rest of `out` is untouched.
    /// Never allocates.
    pub fn read_into(&mut self, out: &mut [f32]) -> usize {
        let to_read = out.len().min(self.available);
        if to_read == 0 {
            return 0;
        }

        let first = to_read.min(self.capacity - self.read_index);
        out[..first].copy_from_slice(&self.buffer[self.read_index..self.read_index + first]);
        out[first..to_read].copy_from_slice(&self.buffer[..to_read - first]);

        self.read_index = (self.read_index + to_read) % self.capacity;
        self.available -= to_read;
        to_read
    }

    /// Number of samples currently available for reading.
    pub fn count(&self) -> usize {
        self.available
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Reset the buffer to empty state.
    pub fn reset(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    /// The total capacity of the buffer, in samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn copy_in(&mut self, samples: &[f32]) {
        let first = samples.len().min(self.capacity - self.write_index);
        self.buffer[self.write_index..self.write_index + first].copy_from_slice(&samples[..first]);
        self.buffer[..samples.len() - first].copy_from_slice(&samples[first..]);

        self.write_index = (self.write_index + samples.len()) % self.capacity;
        self.available += samples.len();
    }
}
