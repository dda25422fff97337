//! # Wire Protocol
//!
//! Chunk messages exchanged between the client and the server. One message
//! carries the audio format, the chunk id and a run of whole frames.
//!
//! ## Round Trip:
//! 1. **Client → Server**: Chunks with ids `0, 1, 2, ...`, then the client half-closes
//! 2. **Server → Client**: One processed chunk per received chunk, in arrival order
//! 3. **End**: The server half-closes after its last reply; the client sees `StreamClosed`

pub mod chunk;
pub mod codec;

pub use chunk::Chunk;
pub use codec::{ChunkDecoder, ChunkEncoder, Decoded};
