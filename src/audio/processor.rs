//! # Gain Processing
//!
//! Applies a decibel gain to raw PCM chunks on the server.
//!
//! ## Processing Steps:
//! 1. **Decode**: Read each sample with the [`SampleWidth`] matching the bit depth
//! 2. **Normalize**: Divide by the full-scale magnitude to get `[-1.0, 1.0]`
//! 3. **Gain**: Multiply by the linear factor `10^(gain_db / 20)`
//! 4. **Clamp**: Limit to `[-1.0, 1.0]` so re-encoding can't overflow
//! 5. **Encode**: Round back to the original width, same buffer length
//!
//! The transform is a pure function of its inputs: the same bytes and gain always
//! produce the same output, bit for bit. At 0 dB it is the identity.

use crate::audio::format::SampleWidth;
use crate::error::{StreamError, StreamResult};
use crate::protocol::Chunk;

/// Convert a gain in decibels to a linear amplitude factor.
pub fn db_to_linear(gain_db: f64) -> f64 {
    10f64.powf(gain_db / 20.0)
}

fn width_for(samples: &[u8], bit_depth: u16) -> StreamResult<SampleWidth> {
    let width = SampleWidth::from_bit_depth(bit_depth)
        .ok_or_else(|| StreamError::Codec(format!("unsupported bit depth {}", bit_depth)))?;
    if samples.len() % width.bytes() != 0 {
        return Err(StreamError::Codec(format!(
            "{} bytes is not a whole number of {}-bit samples",
            samples.len(),
            bit_depth
        )));
    }
    Ok(width)
}

/// Apply `gain_db` to little-endian samples of `bit_depth` bits.
///
/// ## Returns:
/// A new buffer of exactly `samples.len()` bytes.
///
/// ## Errors:
/// `Codec` if the bit depth is unsupported or `samples` holds a partial sample.
pub fn apply(samples: &[u8], bit_depth: u16, gain_db: f64) -> StreamResult<Vec<u8>> {
    let width = width_for(samples, bit_depth)?;
    Ok(apply_linear(samples, width, db_to_linear(gain_db)))
}

fn apply_linear(samples: &[u8], width: SampleWidth, linear: f64) -> Vec<u8> {
    let step = width.bytes();
    let mut out = vec![0u8; samples.len()];

    for (input, output) in samples.chunks_exact(step).zip(out.chunks_exact_mut(step)) {
        let normalized = width.decode(input);
        let gained = (normalized * linear).clamp(-1.0, 1.0);
        width.encode(gained, output);
    }

    out
}

/// Peak absolute normalized amplitude of a sample buffer (0.0 for an empty buffer).
pub fn peak_amplitude(samples: &[u8], bit_depth: u16) -> StreamResult<f64> {
    let width = width_for(samples, bit_depth)?;
    Ok(samples
        .chunks_exact(width.bytes())
        .map(|sample| width.decode(sample).abs())
        .fold(0.0, f64::max))
}

/// Gain stage configured with a fixed decibel value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainProcessor {
    gain_db: f64,
    linear: f64,
}

impl GainProcessor {
    /// Create a processor for `gain_db`.
    ///
    /// ## Errors:
    /// `Config` if the gain is NaN or infinite.
    pub fn new(gain_db: f64) -> StreamResult<Self> {
        if !gain_db.is_finite() {
            return Err(StreamError::Config(format!("gain must be finite, got {}", gain_db)));
        }
        Ok(Self {
            gain_db,
            linear: db_to_linear(gain_db),
        })
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    pub fn linear_gain(&self) -> f64 {
        self.linear
    }

    /// Apply the gain to raw samples.
    pub fn apply(&self, samples: &[u8], bit_depth: u16) -> StreamResult<Vec<u8>> {
        let width = width_for(samples, bit_depth)?;
        Ok(apply_linear(samples, width, self.linear))
    }

    /// Process one chunk. Metadata and chunk id pass through unchanged.
    pub fn process(&self, chunk: &Chunk) -> StreamResult<Chunk> {
        let samples = self.apply(&chunk.samples, chunk.metadata.bit_depth)?;
        Ok(Chunk {
            metadata: chunk.metadata,
            chunk_id: chunk.chunk_id,
            samples,
        })
    }
}
