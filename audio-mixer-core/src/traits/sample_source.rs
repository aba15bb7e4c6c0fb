use crate::models::format::StreamDescriptor;

/// A pull-style producer of interleaved Float32 samples.
///
/// Called from the real-time output thread. Implementations must fill the
/// whole of `out` (silence where no data is available), must not block on
/// other threads for longer than a short critical section, and must not
/// allocate in steady state.
pub trait SampleSource: Send + Sync {
    /// Format of the samples written by [`SampleSource::read`].
    fn format(&self) -> StreamDescriptor;

    /// Fill `out` completely. `out.len()` is a multiple of the channel count.
    fn read(&self, out: &mut [f32]);
}
