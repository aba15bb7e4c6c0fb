/// Pluggable echo-cancellation DSP.
///
/// Receives one block of microphone samples and the time-aligned block of
/// reference samples (same format, same length) and rewrites the microphone
/// block in place.
pub trait EchoStrategy: Send {
    fn process(&mut self, mic: &mut [f32], reference: &[f32], channels: usize);

    /// Drop any adaptive state.
    fn reset(&mut self) {}
}
