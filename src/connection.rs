//! # Connection Handler (server)
//!
//! Per-connection loop: decode a chunk, apply the gain, encode the processed
//! chunk back, repeat.
//!
//! ## Termination:
//! - **StreamClosed**: The client half-closed at a message boundary. The handler
//!   closes its own write half after the last reply, which tells the client no
//!   more replies are coming.
//! - **Codec / Transport error**: Logged, connection dropped, no reply for the failing message.
//!
//! Chunks are answered one at a time, in arrival order. Nothing is buffered
//! across chunks, and `chunk_id` and metadata pass through unchanged.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::audio::GainProcessor;
use crate::error::StreamResult;
use crate::protocol::{ChunkDecoder, ChunkEncoder, Decoded};
use crate::state::ServerState;

/// Totals for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub chunks: usize,
    pub frames: usize,
    pub bytes: usize,
}

/// Handles one accepted connection.
pub struct ConnectionHandler {
    connection_id: Uuid,
    processor: GainProcessor,
    state: ServerState,
}

impl ConnectionHandler {
    pub fn new(connection_id: Uuid, processor: GainProcessor, state: ServerState) -> Self {
        Self {
            connection_id,
            processor,
            state,
        }
    }

    /// Run the decode → gain → encode loop until the client closes.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> StreamResult<ConnectionSummary>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut decoder = ChunkDecoder::new(reader);
        let mut encoder = ChunkEncoder::new(writer);
        let mut summary = ConnectionSummary::default();

        loop {
            match decoder.decode().await? {
                Decoded::Chunk(chunk) => {
                    let processed = self.processor.process(&chunk)?;
                    encoder.encode(&processed).await?;

                    let frames = chunk.frames();
                    summary.chunks += 1;
                    summary.frames += frames;
                    summary.bytes += chunk.samples.len();
                    self.state.record_chunk(chunk.samples.len());

                    debug!(chunk_id = chunk.chunk_id, frames, "Processed chunk");
                }
                Decoded::StreamClosed => {
                    encoder.finish().await?;
                    return Ok(summary);
                }
            }
        }
    }

    /// Serve a TCP connection, logging the outcome and updating server counters.
    pub async fn serve_stream(self, stream: TcpStream, peer: SocketAddr) {
        let span = info_span!("connection", connection_id = %self.connection_id, peer = %peer);

        async move {
            self.state.connection_opened();
            info!("New connection");

            if let Err(err) = stream.set_nodelay(true) {
                debug!(error = %err, "Could not disable Nagle");
            }
            let (reader, writer) = stream.into_split();

            match self.run(reader, writer).await {
                Ok(summary) => {
                    self.state.connection_closed(true);
                    info!(
                        chunks = summary.chunks,
                        frames = summary.frames,
                        bytes = summary.bytes,
                        "Client closed connection"
                    );
                }
                Err(err) => {
                    self.state.connection_closed(false);
                    error!(error = %err, "Connection dropped");
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::{AudioMetadata, WAVE_FORMAT_PCM};
    use crate::audio::processor;
    use crate::error::StreamError;
    use crate::protocol::codec::encode_message;
    use crate::protocol::Chunk;
    use tokio::io::{duplex, split, AsyncWriteExt};

    fn handler(gain_db: f64) -> (ConnectionHandler, ServerState) {
        let state = ServerState::new();
        let handler = ConnectionHandler::new(
            Uuid::new_v4(),
            GainProcessor::new(gain_db).unwrap(),
            state.clone(),
        );
        (handler, state)
    }

    fn chunk(chunk_id: u64, samples: &[i16]) -> Chunk {
        Chunk::new(
            AudioMetadata::new(8000, 1, 16, WAVE_FORMAT_PCM),
            chunk_id,
            samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        )
    }

    #[tokio::test]
    async fn test_replies_in_order_then_closes() {
        let (handler, state) = handler(6.0);
        let (client, server) = duplex(4096);
        let (server_read, server_write) = split(server);
        let task = tokio::spawn(async move { handler.run(server_read, server_write).await });

        let (client_read, client_write) = split(client);
        let mut encoder = ChunkEncoder::new(client_write);
        let mut decoder = ChunkDecoder::new(client_read);

        let sent = vec![chunk(0, &[100, -200]), chunk(1, &[300]), chunk(2, &[-400, 500, 600])];
        for c in &sent {
            encoder.encode(c).await.unwrap();
        }
        encoder.finish().await.unwrap();

        for c in &sent {
            match decoder.decode().await.unwrap() {
                Decoded::Chunk(reply) => {
                    assert_eq!(reply.chunk_id, c.chunk_id);
                    assert_eq!(reply.metadata, c.metadata);
                    assert_eq!(reply.samples, processor::apply(&c.samples, 16, 6.0).unwrap());
                }
                Decoded::StreamClosed => panic!("closed early"),
            }
        }
        assert_eq!(decoder.decode().await.unwrap(), Decoded::StreamClosed);

        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary, ConnectionSummary { chunks: 3, frames: 6, bytes: 12 });
        assert_eq!(state.snapshot().chunks_processed, 3);
    }

    #[tokio::test]
    async fn test_immediate_close_is_clean() {
        let (handler, _) = handler(0.0);
        let (client, server) = duplex(1024);
        drop(client);

        let (reader, writer) = split(server);
        let summary = handler.run(reader, writer).await.unwrap();
        assert_eq!(summary, ConnectionSummary::default());
    }

    #[tokio::test]
    async fn test_truncated_message_fails_without_reply() {
        let (handler, state) = handler(0.0);
        let (mut client, server) = duplex(4096);

        let message = encode_message(&chunk(0, &[1, 2, 3, 4])).unwrap();
        client.write_all(&message[..message.len() - 2]).await.unwrap();
        client.shutdown().await.unwrap();

        let (reader, writer) = split(server);
        let err = handler.run(reader, writer).await.unwrap_err();
        assert!(matches!(err, StreamError::Codec(_)), "{}", err);
        assert_eq!(state.snapshot().chunks_processed, 0);
    }
}
