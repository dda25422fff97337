use crate::audio::format::AudioMetadata;

/// One message on the wire: a contiguous run of whole frames plus the format it is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub metadata: AudioMetadata,

    /// Position of this chunk in its stream, starting at 0
    pub chunk_id: u64,

    /// Raw little-endian sample bytes, a whole number of frames
    pub samples: Vec<u8>,
}

impl Chunk {
    pub fn new(metadata: AudioMetadata, chunk_id: u64, samples: Vec<u8>) -> Self {
        Self {
            metadata,
            chunk_id,
            samples,
        }
    }

    /// Number of whole frames carried by this chunk.
    pub fn frames(&self) -> usize {
        match self.metadata.frame_size() {
            0 => 0,
            frame_size => self.samples.len() / frame_size,
        }
    }
}
