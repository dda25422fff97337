//! # Sample Buffer
//!
//! Owned, frame-aligned storage for the decoded samples of one transfer.
//!
//! ## Key Features:
//! - **Frame alignment**: Length is always a whole number of frames
//! - **Single owner**: Created once when the container is parsed and moved into the cursor
//! - **Reassembly**: Processed chunks are appended back in chunk-id order on the client

use tracing::warn;

use crate::error::{StreamError, StreamResult};

/// Contiguous raw sample bytes whose length is a multiple of `frame_size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    /// Raw little-endian sample bytes
    bytes: Vec<u8>,

    /// Bytes per frame (always > 0)
    frame_size: usize,
}

impl SampleBuffer {
    /// Wrap raw sample bytes.
    ///
    /// ## Alignment:
    /// A trailing partial frame is never valid audio, so any remainder past the
    /// last whole frame is dropped and logged.
    ///
    /// ## Errors:
    /// Returns `Format` if `frame_size` is zero.
    pub fn new(mut bytes: Vec<u8>, frame_size: usize) -> StreamResult<Self> {
        if frame_size == 0 {
            return Err(StreamError::Format(
                "frame size must be greater than zero".to_string(),
            ));
        }

        let remainder = bytes.len() % frame_size;
        if remainder != 0 {
            warn!(
                remainder,
                frame_size,
                "Dropping trailing partial frame from sample data"
            );
            bytes.truncate(bytes.len() - remainder);
        }

        Ok(Self { bytes, frame_size })
    }

    /// Empty buffer with room for `frames` frames, used for reassembly.
    pub fn with_capacity(frame_size: usize, frames: usize) -> StreamResult<Self> {
        let mut buffer = Self::new(Vec::new(), frame_size)?;
        buffer.bytes.reserve(frames.saturating_mul(frame_size));
        Ok(buffer)
    }

    /// Append whole frames.
    ///
    /// ## Errors:
    /// Returns `Protocol` if `bytes` is not a whole number of frames.
    pub fn append_frames(&mut self, bytes: &[u8]) -> StreamResult<()> {
        if bytes.len() % self.frame_size != 0 {
            return Err(StreamError::Protocol(format!(
                "{} bytes is not a whole number of {}-byte frames",
                bytes.len(),
                self.frame_size
            )));
        }
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Number of whole frames in the buffer.
    pub fn frames(&self) -> usize {
        self.bytes.len() / self.frame_size
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes of the frame range `[start, end)`.
    pub fn frame_range(&self, start: usize, end: usize) -> &[u8] {
        &self.bytes[start * self.frame_size..end * self.frame_size]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_frame_is_dropped() {
        let buffer = SampleBuffer::new(vec![0u8; 10], 4).unwrap();
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.frames(), 2);
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        assert!(matches!(
            SampleBuffer::new(vec![0u8; 4], 0),
            Err(StreamError::Format(_))
        ));
    }

    #[test]
    fn test_append_frames() {
        let mut buffer = SampleBuffer::with_capacity(2, 4).unwrap();
        buffer.append_frames(&[1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.frames(), 2);
        assert!(buffer.append_frames(&[5]).is_err());
        assert_eq!(buffer.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(buffer.frame_range(1, 2), &[3, 4]);
    }
}
