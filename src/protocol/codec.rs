//! # Chunk Codec
//!
//! Frames [`Chunk`]s on an ordered byte stream.
//!
//! ## Message Format (little-endian):
//! ```text
//! +-------+-------------+----------+-----------+--------+----------+-------------+---------+
//! | magic | sample_rate | channels | bit_depth | format | chunk_id | payload_len | payload |
//! | 4     | u32         | u16      | u16       | u16    | u64      | u32         | n bytes |
//! +-------+-------------+----------+-----------+--------+----------+-------------+---------+
//! ```
//!
//! ## Decode Outcomes:
//! - **Chunk**: A complete message was read
//! - **StreamClosed**: The peer closed at a message boundary (normal termination)
//! - **Codec error**: The peer closed mid-message, or the header is invalid
//!
//! The decoder keeps partial data in an internal buffer, so callers only ever
//! see whole chunks.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::audio::format::AudioMetadata;
use crate::error::{StreamError, StreamResult};
use crate::protocol::chunk::Chunk;

/// Magic bytes opening every message.
pub const MAGIC: [u8; 4] = *b"WGSC";

/// Fixed header length in bytes.
pub const HEADER_LEN: usize = 26;

/// Largest payload the decoder accepts (64 MiB).
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

const READ_CHUNK: usize = 16 * 1024;

/// Upper bound on buffer growth requested ahead of a payload.
const MAX_RESERVE: usize = READ_CHUNK * 4;

/// Result of one decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Chunk(Chunk),
    /// Clean end of input at a message boundary
    StreamClosed,
}

fn validate_metadata(metadata: &AudioMetadata, payload_len: usize) -> StreamResult<()> {
    let frame_size = metadata.frame_size();
    if frame_size == 0 {
        return Err(StreamError::Codec(format!(
            "zero frame size (channels={}, bit_depth={})",
            metadata.channels, metadata.bit_depth
        )));
    }
    if metadata.sample_width().is_none() {
        return Err(StreamError::Codec(format!(
            "unsupported bit depth {}",
            metadata.bit_depth
        )));
    }
    if payload_len % frame_size != 0 {
        return Err(StreamError::Codec(format!(
            "payload of {} bytes is not a whole number of {}-byte frames",
            payload_len, frame_size
        )));
    }
    if payload_len > MAX_PAYLOAD_BYTES {
        return Err(StreamError::Codec(format!(
            "payload of {} bytes exceeds the {} byte limit",
            payload_len, MAX_PAYLOAD_BYTES
        )));
    }
    Ok(())
}

/// Serialize one chunk into a complete message.
pub fn encode_message(chunk: &Chunk) -> StreamResult<Vec<u8>> {
    validate_metadata(&chunk.metadata, chunk.samples.len())?;

    let mut message = Vec::with_capacity(HEADER_LEN + chunk.samples.len());
    message.extend_from_slice(&MAGIC);
    // Vec<u8> is also AsyncWrite, so the byteorder calls are spelled out
    WriteBytesExt::write_u32::<LittleEndian>(&mut message, chunk.metadata.sample_rate)?;
    WriteBytesExt::write_u16::<LittleEndian>(&mut message, chunk.metadata.channels)?;
    WriteBytesExt::write_u16::<LittleEndian>(&mut message, chunk.metadata.bit_depth)?;
    WriteBytesExt::write_u16::<LittleEndian>(&mut message, chunk.metadata.format)?;
    WriteBytesExt::write_u64::<LittleEndian>(&mut message, chunk.chunk_id)?;
    WriteBytesExt::write_u32::<LittleEndian>(&mut message, chunk.samples.len() as u32)?;
    message.extend_from_slice(&chunk.samples);
    Ok(message)
}

/// Header fields, parsed before the payload has arrived.
struct Header {
    metadata: AudioMetadata,
    chunk_id: u64,
    payload_len: usize,
}

fn parse_header(bytes: &[u8]) -> StreamResult<Header> {
    if bytes[..4] != MAGIC {
        return Err(StreamError::Codec(format!(
            "bad message magic {:02x?}",
            &bytes[..4]
        )));
    }

    let metadata = AudioMetadata {
        sample_rate: LittleEndian::read_u32(&bytes[4..8]),
        channels: LittleEndian::read_u16(&bytes[8..10]),
        bit_depth: LittleEndian::read_u16(&bytes[10..12]),
        format: LittleEndian::read_u16(&bytes[12..14]),
    };
    let chunk_id = LittleEndian::read_u64(&bytes[14..22]);
    let payload_len = LittleEndian::read_u32(&bytes[22..26]) as usize;

    validate_metadata(&metadata, payload_len)?;

    Ok(Header {
        metadata,
        chunk_id,
        payload_len,
    })
}

/// Writes chunks to the outbound half of a connection.
pub struct ChunkEncoder<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> ChunkEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one complete message and flush it.
    pub async fn encode(&mut self, chunk: &Chunk) -> StreamResult<()> {
        let message = encode_message(chunk)?;
        self.writer.write_all(&message).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Flush and shut down the write half. The peer's decoder then sees `StreamClosed`.
    pub async fn finish(&mut self) -> StreamResult<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Reads chunks from the inbound half of a connection.
pub struct ChunkDecoder<R> {
    reader: R,

    /// Bytes received but not yet returned as a chunk
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> ChunkDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Read the next complete chunk.
    ///
    /// ## Returns:
    /// - **Ok(Decoded::Chunk)**: A full message arrived
    /// - **Ok(Decoded::StreamClosed)**: EOF with nothing buffered
    /// - **Err(Codec)**: EOF mid-message, or an invalid header
    /// - **Err(Transport)**: The read itself failed
    pub async fn decode(&mut self) -> StreamResult<Decoded> {
        let mut scratch = [0u8; READ_CHUNK];
        loop {
            if let Some(chunk) = self.take_message()? {
                return Ok(Decoded::Chunk(chunk));
            }

            let n = self.reader.read(&mut scratch).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(Decoded::StreamClosed);
                }
                return Err(StreamError::Codec(format!(
                    "stream closed mid-message with {} bytes buffered",
                    self.buffer.len()
                )));
            }
            self.buffer.extend_from_slice(&scratch[..n]);
        }
    }

    /// Split a complete message off the front of the buffer, if there is one.
    fn take_message(&mut self) -> StreamResult<Option<Chunk>> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let header = parse_header(&self.buffer[..HEADER_LEN])?;
        let total = HEADER_LEN + header.payload_len;
        if self.buffer.len() < total {
            // Grow with the bytes that actually arrive, not with the declared length
            let missing = total - self.buffer.len();
            self.buffer.reserve(missing.min(MAX_RESERVE));
            return Ok(None);
        }

        let samples = self.buffer[HEADER_LEN..total].to_vec();
        self.buffer.drain(..total);

        Ok(Some(Chunk {
            metadata: header.metadata,
            chunk_id: header.chunk_id,
            samples,
        }))
    }
}
