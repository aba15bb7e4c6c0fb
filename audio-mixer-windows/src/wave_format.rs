//! Interpretation of `WAVEFORMATEX` / `WAVEFORMATEXTENSIBLE` headers.
//!
//! Shared-mode endpoints usually report an extensible header whose real
//! encoding lives in the sub-format GUID. PCM with a 24-bit valid depth in a
//! 32-bit container is left-justified, so it reads correctly as `Pcm32`.

use audio_mixer_core::models::format::{WAVE_FORMAT_EXTENSIBLE, WAVE_FORMAT_IEEE_FLOAT};
use audio_mixer_core::{MixerError, SampleEncoding, StreamDescriptor};

/// Header fields that decide how a capture buffer is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormatFields {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    /// Container size, not the valid bit depth.
    pub bits_per_sample: u16,
    /// Plain format tag equivalent of an extensible header's sub-format.
    pub sub_format_tag: Option<u16>,
}

impl WaveFormatFields {
    pub fn descriptor(&self) -> Result<StreamDescriptor, MixerError> {
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(MixerError::UnsupportedFormat(format!(
                "{} Hz with {} channels",
                self.sample_rate, self.channels
            )));
        }
        let tag = if self.format_tag == WAVE_FORMAT_EXTENSIBLE {
            self.sub_format_tag.ok_or_else(|| {
                MixerError::UnsupportedFormat("extensible format with an unknown sub-format".into())
            })?
        } else {
            self.format_tag
        };
        let encoding = SampleEncoding::from_wave_format(tag, self.bits_per_sample)?;
        Ok(StreamDescriptor::new(self.sample_rate, self.channels, encoding))
    }

    /// Plain IEEE-float header for a Float32 render stream.
    pub fn float32(format: &StreamDescriptor) -> Self {
        Self {
            format_tag: WAVE_FORMAT_IEEE_FLOAT,
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 32,
            sub_format_tag: None,
        }
    }
}

#[cfg(target_os = "windows")]
pub(crate) use self::native::{read_wave_format, to_wave_format};

#[cfg(target_os = "windows")]
mod native {
    use windows::Win32::Media::Audio::{WAVEFORMATEX, WAVEFORMATEXTENSIBLE};
    use windows::Win32::Media::KernelStreaming::KSDATAFORMAT_SUBTYPE_PCM;
    use windows::Win32::Media::Multimedia::KSDATAFORMAT_SUBTYPE_IEEE_FLOAT;

    use audio_mixer_core::models::format::WAVE_FORMAT_PCM;

    use super::*;

    const EXTENSIBLE_EXTRA_BYTES: u16 = 22;

    /// Read the header at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point to a valid header as returned by `GetMixFormat`.
    pub(crate) unsafe fn read_wave_format(ptr: *const WAVEFORMATEX) -> Result<StreamDescriptor, MixerError> {
        let header = std::ptr::read_unaligned(ptr);
        let sub_format_tag = if header.wFormatTag == WAVE_FORMAT_EXTENSIBLE && header.cbSize >= EXTENSIBLE_EXTRA_BYTES {
            let extensible = std::ptr::read_unaligned(ptr as *const WAVEFORMATEXTENSIBLE);
            let sub_format = extensible.SubFormat;
            if sub_format == KSDATAFORMAT_SUBTYPE_IEEE_FLOAT {
                Some(WAVE_FORMAT_IEEE_FLOAT)
            } else if sub_format == KSDATAFORMAT_SUBTYPE_PCM {
                Some(WAVE_FORMAT_PCM)
            } else {
                None
            }
        } else {
            None
        };
        WaveFormatFields {
            format_tag: header.wFormatTag,
            channels: header.nChannels,
            sample_rate: header.nSamplesPerSec,
            bits_per_sample: header.wBitsPerSample,
            sub_format_tag,
        }
        .descriptor()
    }

    pub(crate) fn to_wave_format(fields: &WaveFormatFields) -> WAVEFORMATEX {
        let block_align = fields.channels * (fields.bits_per_sample / 8);
        WAVEFORMATEX {
            wFormatTag: fields.format_tag,
            nChannels: fields.channels,
            nSamplesPerSec: fields.sample_rate,
            nAvgBytesPerSec: fields.sample_rate * u32::from(block_align),
            nBlockAlign: block_align,
            wBitsPerSample: fields.bits_per_sample,
            cbSize: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use audio_mixer_core::models::format::WAVE_FORMAT_PCM;

    use super::*;

    fn fields(format_tag: u16, bits_per_sample: u16, sub_format_tag: Option<u16>) -> WaveFormatFields {
        WaveFormatFields {
            format_tag,
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample,
            sub_format_tag,
        }
    }

    #[test]
    fn extensible_float_mix_format() {
        let descriptor = fields(WAVE_FORMAT_EXTENSIBLE, 32, Some(WAVE_FORMAT_IEEE_FLOAT))
            .descriptor()
            .unwrap();
        assert_eq!(descriptor, StreamDescriptor::float32(48_000, 2));
    }

    #[test]
    fn padded_24_bit_pcm_reads_as_32_bit() {
        let descriptor = fields(WAVE_FORMAT_EXTENSIBLE, 32, Some(WAVE_FORMAT_PCM)).descriptor().unwrap();
        assert_eq!(descriptor.encoding, SampleEncoding::Pcm32);
    }

    #[test]
    fn plain_pcm_header() {
        let descriptor = fields(WAVE_FORMAT_PCM, 16, None).descriptor().unwrap();
        assert_eq!(descriptor.encoding, SampleEncoding::Pcm16);
    }

    #[test]
    fn unknown_sub_format_is_unsupported() {
        assert!(matches!(
            fields(WAVE_FORMAT_EXTENSIBLE, 32, None).descriptor(),
            Err(MixerError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn empty_stream_is_unsupported() {
        let mut header = fields(WAVE_FORMAT_PCM, 16, None);
        header.channels = 0;
        assert!(matches!(header.descriptor(), Err(MixerError::UnsupportedFormat(_))));
    }

    #[test]
    fn float32_render_header() {
        let header = WaveFormatFields::float32(&StreamDescriptor::float32(44_100, 1));
        assert_eq!(header.descriptor().unwrap(), StreamDescriptor::float32(44_100, 1));
    }
}
