//! # Audio Format Description
//!
//! Describes the PCM layout carried with every chunk, and the per-width sample
//! conversions used by the gain processor.
//!
//! ## Supported Sample Widths:
//! - **8-bit**: Unsigned, centered on 128 (the WAV convention)
//! - **16-bit / 24-bit / 32-bit**: Signed two's complement, little-endian
//!
//! Normalized values are in `[-1.0, 1.0]`, computed by dividing by the full-scale
//! magnitude `2^(bits - 1)`.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// WAV format tag for integer PCM.
pub const WAVE_FORMAT_PCM: u16 = 0x0001;

/// WAV format tag for WAVE_FORMAT_EXTENSIBLE (integer PCM sub-format assumed).
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Audio format metadata parsed from the WAV header.
///
/// Immutable once parsed; travels unchanged with every chunk on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    /// Format tag (1 = linear PCM)
    pub format: u16,
}

impl AudioMetadata {
    pub fn new(sample_rate: u32, channels: u16, bit_depth: u16, format: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth,
            format,
        }
    }

    /// Size of one frame in bytes: `channels * (bit_depth / 8)`.
    ///
    /// A zero result means the metadata can't describe any audio.
    pub fn frame_size(&self) -> usize {
        self.channels as usize * (self.bit_depth / 8) as usize
    }

    /// Sample width strategy for this metadata, if the bit depth is supported.
    pub fn sample_width(&self) -> Option<SampleWidth> {
        SampleWidth::from_bit_depth(self.bit_depth)
    }

    /// Duration in seconds of `frames` frames at this sample rate.
    pub fn duration_seconds(&self, frames: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }
}

/// One conversion strategy per supported bit depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    /// Unsigned with silence at 128: 8-bit WAV data is offset-binary, not two's complement
    U8,
    S16,
    S24,
    S32,
}

impl SampleWidth {
    /// Select the strategy for a bit depth. Returns `None` for unsupported depths.
    pub fn from_bit_depth(bit_depth: u16) -> Option<Self> {
        match bit_depth {
            8 => Some(SampleWidth::U8),
            16 => Some(SampleWidth::S16),
            24 => Some(SampleWidth::S24),
            32 => Some(SampleWidth::S32),
            _ => None,
        }
    }

    /// Bytes per sample.
    pub fn bytes(self) -> usize {
        match self {
            SampleWidth::U8 => 1,
            SampleWidth::S16 => 2,
            SampleWidth::S24 => 3,
            SampleWidth::S32 => 4,
        }
    }

    /// Magnitude of the most negative sample value (`2^(bits - 1)`).
    pub fn full_scale(self) -> f64 {
        match self {
            SampleWidth::U8 => 128.0,
            SampleWidth::S16 => 32_768.0,
            SampleWidth::S24 => 8_388_608.0,
            SampleWidth::S32 => 2_147_483_648.0,
        }
    }

    /// Read one sample as a signed integer centered on zero.
    ///
    /// `bytes` must hold at least [`SampleWidth::bytes`] bytes.
    pub fn read(self, bytes: &[u8]) -> i32 {
        match self {
            SampleWidth::U8 => bytes[0] as i32 - 128,
            SampleWidth::S16 => LittleEndian::read_i16(bytes) as i32,
            SampleWidth::S24 => LittleEndian::read_i24(bytes),
            SampleWidth::S32 => LittleEndian::read_i32(bytes),
        }
    }

    /// Write one signed sample back in this width. The value must already be in range.
    pub fn write(self, value: i32, out: &mut [u8]) {
        match self {
            SampleWidth::U8 => out[0] = (value + 128) as u8,
            SampleWidth::S16 => LittleEndian::write_i16(out, value as i16),
            SampleWidth::S24 => LittleEndian::write_i24(out, value),
            SampleWidth::S32 => LittleEndian::write_i32(out, value),
        }
    }

    /// Read one sample normalized to `[-1.0, 1.0]`.
    pub fn decode(self, bytes: &[u8]) -> f64 {
        self.read(bytes) as f64 / self.full_scale()
    }

    /// Write a normalized value, rounding to nearest and saturating at the integer range.
    pub fn encode(self, normalized: f64, out: &mut [u8]) {
        let full_scale = self.full_scale();
        let scaled = (normalized * full_scale).round();
        let clamped = scaled.clamp(-full_scale, full_scale - 1.0);
        self.write(clamped as i32, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        assert_eq!(AudioMetadata::new(44100, 2, 16, WAVE_FORMAT_PCM).frame_size(), 4);
        assert_eq!(AudioMetadata::new(48000, 6, 24, WAVE_FORMAT_PCM).frame_size(), 18);
        assert_eq!(AudioMetadata::new(8000, 0, 16, WAVE_FORMAT_PCM).frame_size(), 0);
        assert_eq!(AudioMetadata::new(8000, 1, 4, WAVE_FORMAT_PCM).frame_size(), 0);
    }

    #[test]
    fn test_duration_seconds() {
        let metadata = AudioMetadata::new(8000, 1, 16, WAVE_FORMAT_PCM);
        assert_eq!(metadata.duration_seconds(10_000), 1.25);
        assert_eq!(AudioMetadata::new(0, 1, 16, WAVE_FORMAT_PCM).duration_seconds(10), 0.0);
    }

    #[test]
    fn test_width_selection() {
        assert_eq!(SampleWidth::from_bit_depth(8), Some(SampleWidth::U8));
        assert_eq!(SampleWidth::from_bit_depth(24), Some(SampleWidth::S24));
        assert_eq!(SampleWidth::from_bit_depth(12), None);
        assert_eq!(SampleWidth::from_bit_depth(64), None);
    }

    #[test]
    fn test_extreme_values_round_trip() {
        let cases: [(SampleWidth, i32, i32); 4] = [
            (SampleWidth::U8, -128, 127),
            (SampleWidth::S16, i16::MIN as i32, i16::MAX as i32),
            (SampleWidth::S24, -8_388_608, 8_388_607),
            (SampleWidth::S32, i32::MIN, i32::MAX),
        ];

        for (width, min, max) in cases {
            let mut buf = [0u8; 4];
            for value in [min, -1, 0, 1, max] {
                width.write(value, &mut buf);
                assert_eq!(width.read(&buf), value, "{:?} {}", width, value);
                let normalized = width.decode(&buf);
                assert!((-1.0..=1.0).contains(&normalized));
                width.encode(normalized, &mut buf);
                assert_eq!(width.read(&buf), value, "{:?} {}", width, value);
            }
        }
    }

    #[test]
    fn test_encode_saturates() {
        let mut buf = [0u8; 2];
        SampleWidth::S16.encode(1.0, &mut buf);
        assert_eq!(SampleWidth::S16.read(&buf), 32767);
        SampleWidth::S16.encode(-1.0, &mut buf);
        assert_eq!(SampleWidth::S16.read(&buf), -32768);
    }

    #[test]
    fn test_unsigned_eight_bit_midpoint() {
        assert_eq!(SampleWidth::U8.read(&[128]), 0);
        assert_eq!(SampleWidth::U8.read(&[0]), -128);
        assert_eq!(SampleWidth::U8.read(&[255]), 127);
    }
}
