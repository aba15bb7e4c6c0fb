//! Push-to-pull bridge between a capture thread and the output thread.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::models::format::StreamDescriptor;
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::sample_source::SampleSource;

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeStats {
    pub writes: u64,
    pub overflow_drops: u64,
    pub underruns: u64,
    pub buffered: usize,
}

/// Absorbs variable-sized, arbitrarily-timed capture blocks and serves
/// fixed-size reads.
///
/// One writer (capture callback) and one reader (output thread). Both sides
/// hold the lock only for a bounded memcpy, never across I/O or allocation.
/// Reads always return the requested length, padding missing samples with
/// silence.
#[derive(Debug)]
pub struct PushPullBridge {
    ring: Mutex<RingBuffer>,
    format: StreamDescriptor,
    discard_on_overflow: bool,
    writes: AtomicU64,
    overflow_drops: AtomicU64,
    underruns: AtomicU64,
}

impl PushPullBridge {
    /// Create a bridge for Float32 samples in `format`, holding up to
    /// `capacity` interleaved samples.
    pub fn new(format: StreamDescriptor, capacity: usize, discard_on_overflow: bool) -> Self {
        Self {
            ring: Mutex::new(RingBuffer::new(capacity, format.channels as usize)),
            format,
            discard_on_overflow,
            writes: AtomicU64::new(0),
            overflow_drops: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
        }
    }

    /// Store a captured block. Never blocks beyond the short ring critical
    /// section and never fails; returns the number of samples kept.
    pub fn write(&self, samples: &[f32]) -> usize {
        let outcome = self.ring.lock().write(samples, self.discard_on_overflow);
        self.writes.fetch_add(1, Ordering::Relaxed);
        if outcome.dropped > 0 {
            self.overflow_drops
                .fetch_add(outcome.dropped as u64, Ordering::Relaxed);
        }
        outcome.written
    }

    /// Samples currently buffered.
    pub fn buffered(&self) -> usize {
        self.ring.lock().count()
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            writes: self.writes.load(Ordering::Relaxed),
            overflow_drops: self.overflow_drops.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            buffered: self.buffered(),
        }
    }
}

impl SampleSource for PushPullBridge {
    fn format(&self) -> StreamDescriptor {
        self.format
    }

    fn read(&self, out: &mut [f32]) {
        let copied = self.ring.lock().read_into(out);
        if copied < out.len() {
            out[copied..].fill(0.0);
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn stereo() -> StreamDescriptor {
        StreamDescriptor::float32(48_000, 2)
    }

    #[test]
    fn underflow_pads_with_silence() {
        let bridge = PushPullBridge::new(stereo(), 64, true);
        bridge.write(&[0.5, 0.5, 0.25, 0.25]);

        let mut out = [9.0f32; 8];
        bridge.read(&mut out);

        assert_eq!(out, [0.5, 0.5, 0.25, 0.25, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(bridge.stats().underruns, 1);
    }

    #[test]
    fn empty_bridge_reads_silence() {
        let bridge = PushPullBridge::new(stereo(), 64, true);
        let mut out = [1.0f32; 16];
        bridge.read(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn overflow_discards_and_is_observable() {
        let bridge = PushPullBridge::new(stereo(), 8, true);
        for _ in 0..100 {
            bridge.write(&[0.1; 6]);
        }

        let stats = bridge.stats();
        assert_eq!(stats.writes, 100);
        assert_eq!(stats.buffered, 8);
        assert_eq!(stats.overflow_drops, 600 - 8);
        assert_eq!(bridge.capacity(), 8);
    }

    #[test]
    fn rejecting_bridge_keeps_oldest() {
        let bridge = PushPullBridge::new(stereo(), 4, false);
        assert_eq!(bridge.write(&[1.0, 1.0, 2.0, 2.0]), 4);
        assert_eq!(bridge.write(&[3.0, 3.0]), 0);

        let mut out = [0.0f32; 4];
        bridge.read(&mut out);
        assert_eq!(out, [1.0, 1.0, 2.0, 2.0]);
        assert_eq!(bridge.stats().overflow_drops, 2);
    }

    #[test]
    fn concurrent_writer_and_reader_complete() {
        let bridge = Arc::new(PushPullBridge::new(stereo(), 9_600, true));
        let writer_bridge = Arc::clone(&bridge);

        let started = Instant::now();
        let writer = thread::spawn(move || {
            // Irregular block sizes, as capture devices deliver them.
            for i in 0..2_000usize {
                let frames = 1 + (i * 37) % 700;
                let block = vec![0.25f32; frames * 2];
                writer_bridge.write(&block);
            }
        });

        let mut out = vec![0.0f32; 960];
        for _ in 0..2_000 {
            bridge.read(&mut out);
            assert_eq!(out.len(), 960);
            assert!(out.iter().all(|s| *s == 0.0 || *s == 0.25));
        }
        writer.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(bridge.buffered() <= 9_600);
    }
}
