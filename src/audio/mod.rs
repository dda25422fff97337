//! # Audio Processing Module
//!
//! WAV parsing, frame-aligned chunking, and the per-chunk gain transform.
//!
//! ## Key Components:
//! - **wav**: Container parsing (and writing of processed output)
//! - **format**: Audio metadata and per-bit-depth sample conversion
//! - **buffer**: Frame-aligned sample storage
//! - **cursor**: Chunk-by-chunk walk over the sample buffer
//! - **processor**: Decibel gain applied to raw PCM
//!
//! ## Audio Format Requirements:
//! - **Encoding**: Linear PCM, little-endian
//! - **Bit Depth**: 8 (unsigned), 16, 24 or 32 (signed)
//! - **Channels / Sample Rate**: Any; carried through unchanged

pub mod buffer;
pub mod cursor;
pub mod format;
pub mod processor;
pub mod wav;

pub use buffer::SampleBuffer;
pub use cursor::{CursorStep, SampleStreamCursor};
pub use format::{AudioMetadata, SampleWidth};
pub use processor::GainProcessor;
