use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

/// Linear gain with mute/unmute restoration for one mixer input.
///
/// The audio thread only ever calls [`GainControl::effective_gain`], which is
/// two atomic loads. Mutations come from the control thread and are serialized
/// by a private lock so that mute bookkeeping (stored gain vs. pre-mute gain)
/// stays consistent; the audio thread never takes that lock.
#[derive(Debug)]
pub struct GainControl {
    gain: AtomicU32,
    pre_mute_gain: AtomicU32,
    muted: AtomicBool,
    control: Mutex<()>,
}

impl GainControl {
    pub fn new(gain: f32) -> Self {
        let gain = sanitize(gain);
        Self {
            gain: AtomicU32::new(gain.to_bits()),
            pre_mute_gain: AtomicU32::new(gain.to_bits()),
            muted: AtomicBool::new(false),
            control: Mutex::new(()),
        }
    }

    /// Set the stored gain. Negative and NaN values become 0.0.
    ///
    /// While muted the new value is remembered and restored on unmute, but the
    /// input stays silent.
    pub fn set_gain(&self, gain: f32) {
        let _guard = self.control.lock();
        let gain = sanitize(gain);
        self.gain.store(gain.to_bits(), Ordering::Release);
        if self.muted.load(Ordering::Acquire) {
            self.pre_mute_gain.store(gain.to_bits(), Ordering::Release);
        }
    }

    /// Mute stores the current gain; unmute restores it, or 1.0 if it was 0.
    pub fn set_mute(&self, muted: bool) {
        let _guard = self.control.lock();
        let was_muted = self.muted.load(Ordering::Acquire);
        if muted == was_muted {
            return;
        }

        if muted {
            let current = self.gain.load(Ordering::Acquire);
            self.pre_mute_gain.store(current, Ordering::Release);
            self.muted.store(true, Ordering::Release);
        } else {
            let restored = f32::from_bits(self.pre_mute_gain.load(Ordering::Acquire));
            let restored = if restored == 0.0 { 1.0 } else { restored };
            self.gain.store(restored.to_bits(), Ordering::Release);
            self.muted.store(false, Ordering::Release);
        }
    }

    /// Gain applied during mixing: 0.0 while muted, the stored gain otherwise.
    #[inline]
    pub fn effective_gain(&self) -> f32 {
        if self.muted.load(Ordering::Acquire) {
            0.0
        } else {
            f32::from_bits(self.gain.load(Ordering::Acquire))
        }
    }

    /// The stored gain, regardless of mute state.
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Acquire))
    }

    pub fn pre_mute_gain(&self) -> f32 {
        f32::from_bits(self.pre_mute_gain.load(Ordering::Acquire))
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }
}

impl Default for GainControl {
    fn default() -> Self {
        Self::new(1.0)
    }
}

fn sanitize(gain: f32) -> f32 {
    if gain.is_nan() || gain < 0.0 {
        0.0
    } else {
        gain
    }
}
