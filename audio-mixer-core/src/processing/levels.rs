use std::sync::atomic::{AtomicU32, Ordering};

/// Peak absolute level of samples.
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Compute RMS level of samples (0.0–1.0 range for normalized audio).
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Lock-free holder of the most recent block's peak level.
///
/// Written by the capture thread, read by the session monitor.
#[derive(Debug)]
pub struct LevelMeter {
    peak_bits: AtomicU32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            peak_bits: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    /// Record the peak of a freshly captured block, clamped to 0.0–1.0.
    pub fn record_block(&self, samples: &[f32]) {
        let peak = peak_level(samples).min(1.0);
        self.peak_bits.store(peak.to_bits(), Ordering::Relaxed);
    }

    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.peak_bits.store(0.0f32.to_bits(), Ordering::Relaxed);
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}
