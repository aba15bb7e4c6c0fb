use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::MixerError;

/// `WAVE_FORMAT_PCM` format tag.
pub const WAVE_FORMAT_PCM: u16 = 0x0001;
/// `WAVE_FORMAT_IEEE_FLOAT` format tag.
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
/// `WAVE_FORMAT_EXTENSIBLE` format tag; the real encoding lives in the sub-format GUID.
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Sample encoding of a raw audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleEncoding {
    Pcm16,
    Pcm24,
    Pcm32,
    Float32,
}

impl SampleEncoding {
    /// Resolve an encoding from a WAVE format tag and bit depth.
    ///
    /// For `WAVE_FORMAT_EXTENSIBLE`, pass the tag carried by the sub-format
    /// GUID (PCM or IEEE float) as `format_tag`.
    pub fn from_wave_format(format_tag: u16, bits_per_sample: u16) -> Result<Self, MixerError> {
        match (format_tag, bits_per_sample) {
            (WAVE_FORMAT_PCM, 16) => Ok(Self::Pcm16),
            (WAVE_FORMAT_PCM, 24) => Ok(Self::Pcm24),
            (WAVE_FORMAT_PCM, 32) => Ok(Self::Pcm32),
            (WAVE_FORMAT_IEEE_FLOAT, 32) => Ok(Self::Float32),
            (tag, bits) => Err(MixerError::UnsupportedFormat(format!(
                "format tag {tag:#06x} with {bits} bits per sample"
            ))),
        }
    }

    /// Bytes occupied by one sample of one channel.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Pcm16 => 2,
            Self::Pcm24 => 3,
            Self::Pcm32 | Self::Float32 => 4,
        }
    }

    pub fn bits_per_sample(self) -> u16 {
        self.bytes_per_sample() as u16 * 8
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pcm16 => "PCM16",
            Self::Pcm24 => "PCM24",
            Self::Pcm32 => "PCM32",
            Self::Float32 => "Float32",
        };
        f.write_str(name)
    }
}

/// Immutable description of an audio stream: rate, channel count, encoding.
///
/// Equality is exact; two streams are compatible only when all three fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl StreamDescriptor {
    pub const fn new(sample_rate: u32, channels: u16, encoding: SampleEncoding) -> Self {
        Self {
            sample_rate,
            channels,
            encoding,
        }
    }

    /// Interleaved Float32 at the given rate and channel count.
    pub const fn float32(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, channels, SampleEncoding::Float32)
    }

    /// The same rate and channel count, re-encoded as Float32.
    pub fn to_float32(self) -> Self {
        Self::float32(self.sample_rate, self.channels)
    }

    /// Bytes per interleaved frame (all channels).
    pub fn block_align(&self) -> usize {
        self.encoding.bytes_per_sample() * self.channels as usize
    }

    /// Interleaved sample count covering `duration_ms` milliseconds.
    pub fn samples_for_millis(&self, duration_ms: u64) -> usize {
        let frames = self.sample_rate as u64 * duration_ms / 1000;
        frames as usize * self.channels as usize
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz, {} ch, {}", self.sample_rate, self.channels, self.encoding)
    }
}

/// Default canonical mixing format: 48 kHz, stereo, Float32.
pub const CANONICAL_FORMAT: StreamDescriptor = StreamDescriptor::float32(48_000, 2);
