//! Format normalization: raw PCM/float bytes to interleaved Float32.
//!
//! Never changes rate or channel count; see `resampler` for that.

use crate::models::error::MixerError;
use crate::models::format::{SampleEncoding, StreamDescriptor};

const PCM16_SCALE: f32 = 32_768.0;
const PCM24_SCALE: f32 = 8_388_608.0;
const PCM32_SCALE: f64 = 2_147_483_648.0;

/// Convert little-endian `data` described by `format` into Float32 samples.
///
/// Output is appended to `out` (which is cleared first) so callers can reuse
/// one allocation across blocks. Trailing bytes that do not form a whole
/// frame are ignored. Integer encodings map to `[-1.0, 1.0)`; Float32 passes
/// through untouched.
pub fn normalize(format: &StreamDescriptor, data: &[u8], out: &mut Vec<f32>) -> Result<(), MixerError> {
    out.clear();
    if format.channels == 0 {
        return Err(MixerError::UnsupportedFormat("zero channels".into()));
    }

    let block_align = format.block_align();
    let whole = data.len() - data.len() % block_align;
    if whole != data.len() {
        log::debug!(
            "dropping {} trailing bytes of a partial {} frame",
            data.len() - whole,
            format
        );
    }
    let data = &data[..whole];
    out.reserve(whole / format.encoding.bytes_per_sample());

    match format.encoding {
        SampleEncoding::Pcm16 => out.extend(
            data.chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / PCM16_SCALE),
        ),
        SampleEncoding::Pcm24 => out.extend(data.chunks_exact(3).map(|b| {
            // Place the 24-bit value in the top of an i32, then shift back to sign-extend.
            let value = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
            value as f32 / PCM24_SCALE
        })),
        SampleEncoding::Pcm32 => out.extend(data.chunks_exact(4).map(|b| {
            let value = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            (value as f64 / PCM32_SCALE) as f32
        })),
        SampleEncoding::Float32 => out.extend(
            data.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        ),
    }
    Ok(())
}
