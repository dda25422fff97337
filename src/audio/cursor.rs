//! # Sample Stream Cursor
//!
//! Walks a [`SampleBuffer`] in frame-aligned chunks for the client's send loop.
//!
//! ## Cursor Lifecycle:
//! 1. **Streaming**: Each `advance` returns up to `max_frames` whole frames
//! 2. **EOF**: Reported on the call that consumes the last frame (together with that chunk)
//! 3. **Terminal**: Later calls return an empty chunk with `is_eof = true`, never an error

use crate::audio::buffer::SampleBuffer;
use crate::audio::format::AudioMetadata;

/// One step of the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorStep<'a> {
    /// Id for this chunk. Only meaningful when `bytes` is non-empty.
    pub chunk_id: u64,

    /// Whole frames starting at the previous cursor position
    pub bytes: &'a [u8],

    /// Number of frames in `bytes`
    pub frames: usize,

    /// True once every frame has been consumed
    pub is_eof: bool,
}

/// Owns the sample buffer of one transfer and hands it out chunk by chunk.
///
/// ## Invariants:
/// - `0 <= frames_consumed <= total_frames`, never decreasing
/// - `next_chunk_id` increases by exactly one per non-empty chunk, starting at 0
/// - EOF holds exactly when `frames_consumed == total_frames`
#[derive(Debug)]
pub struct SampleStreamCursor {
    metadata: AudioMetadata,
    buffer: SampleBuffer,
    total_frames: usize,
    frames_consumed: usize,
    next_chunk_id: u64,
}

impl SampleStreamCursor {
    pub fn new(metadata: AudioMetadata, buffer: SampleBuffer) -> Self {
        let total_frames = buffer.frames();
        Self {
            metadata,
            buffer,
            total_frames,
            frames_consumed: 0,
            next_chunk_id: 0,
        }
    }

    /// Produce the next chunk of at most `max_frames` frames.
    ///
    /// ## Example:
    /// With 10000 frames and `max_frames = 4096` the cursor yields 4096, 4096 and
    /// 1808 frames, with `is_eof` set on the third call.
    pub fn advance(&mut self, max_frames: usize) -> CursorStep<'_> {
        let start = self.frames_consumed;
        let end = start + max_frames.min(self.total_frames - start);
        let frames = end - start;

        let chunk_id = self.next_chunk_id;
        if frames > 0 {
            self.frames_consumed = end;
            self.next_chunk_id += 1;
        }

        CursorStep {
            chunk_id,
            bytes: self.buffer.frame_range(start, end),
            frames,
            is_eof: self.is_eof(),
        }
    }

    pub fn is_eof(&self) -> bool {
        self.frames_consumed == self.total_frames
    }

    /// Number of chunks a full pass produces: `ceil(total_frames / chunk_frames)`.
    pub fn chunk_count(&self, chunk_frames: usize) -> usize {
        if chunk_frames == 0 {
            return 0;
        }
        self.total_frames.div_ceil(chunk_frames)
    }

    pub fn metadata(&self) -> &AudioMetadata {
        &self.metadata
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn frames_consumed(&self) -> usize {
        self.frames_consumed
    }

    pub fn next_chunk_id(&self) -> u64 {
        self.next_chunk_id
    }

    pub fn frame_size(&self) -> usize {
        self.buffer.frame_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::WAVE_FORMAT_PCM;

    fn mono16_cursor(frames: usize) -> SampleStreamCursor {
        let metadata = AudioMetadata::new(8000, 1, 16, WAVE_FORMAT_PCM);
        let bytes: Vec<u8> = (0..frames * 2).map(|i| (i % 251) as u8).collect();
        let buffer = SampleBuffer::new(bytes, metadata.frame_size()).unwrap();
        SampleStreamCursor::new(metadata, buffer)
    }

    #[test]
    fn test_exact_eof_boundary() {
        let mut cursor = mono16_cursor(10_000);
        assert_eq!(cursor.chunk_count(4096), 3);

        let first = cursor.advance(4096);
        assert_eq!((first.frames, first.is_eof), (4096, false));
        let second = cursor.advance(4096);
        assert_eq!((second.frames, second.is_eof), (4096, false));
        let third = cursor.advance(4096);
        assert_eq!((third.frames, third.is_eof), (1808, true));
        assert_eq!(third.bytes.len(), 1808 * 2);
        assert_eq!(cursor.frames_consumed(), cursor.total_frames());
    }

    #[test]
    fn test_terminal_state_is_idempotent() {
        let mut cursor = mono16_cursor(3);
        let step = cursor.advance(8);
        assert_eq!((step.frames, step.is_eof), (3, true));

        for _ in 0..3 {
            let step = cursor.advance(8);
            assert!(step.bytes.is_empty());
            assert!(step.is_eof);
        }
        assert_eq!(cursor.next_chunk_id(), 1);
    }

    #[test]
    fn test_empty_stream_reports_eof_immediately() {
        let mut cursor = mono16_cursor(0);
        assert_eq!(cursor.chunk_count(4096), 0);
        let step = cursor.advance(4096);
        assert!(step.bytes.is_empty());
        assert!(step.is_eof);
        assert_eq!(cursor.next_chunk_id(), 0);
    }

    #[test]
    fn test_reassembly_and_id_sequence() {
        let mut cursor = mono16_cursor(1000);
        let original = cursor.buffer.as_bytes().to_vec();

        let mut reassembled = Vec::new();
        let mut ids = Vec::new();
        loop {
            let step = cursor.advance(96);
            if !step.bytes.is_empty() {
                ids.push(step.chunk_id);
                reassembled.extend_from_slice(step.bytes);
            }
            if step.is_eof {
                break;
            }
        }

        assert_eq!(reassembled, original);
        let expected: Vec<u64> = (0..cursor.chunk_count(96) as u64).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_chunks_are_frame_aligned() {
        let metadata = AudioMetadata::new(44100, 2, 24, WAVE_FORMAT_PCM);
        let buffer = SampleBuffer::new(vec![0u8; 6 * 101], metadata.frame_size()).unwrap();
        let mut cursor = SampleStreamCursor::new(metadata, buffer);

        while !cursor.is_eof() {
            let step = cursor.advance(10);
            assert_eq!(step.bytes.len() % 6, 0);
            assert_eq!(step.bytes.len(), step.frames * 6);
        }
    }
}
