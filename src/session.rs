//! # Streaming Session (client)
//!
//! Drives one transfer over one connection: chunks go out on the write half
//! while processed chunks come back on the read half.
//!
//! ## Session Lifecycle:
//! 1. **Sending**: The send task walks the cursor and writes each chunk
//! 2. **AwaitingDrain**: Every chunk is sent and the write half is closed; replies are still arriving
//! 3. **Closed**: The server closed its side and every reply was checked and reassembled
//! 4. **Failed**: Any stage failed; the session is aborted without retry
//!
//! ## Concurrency:
//! - **Send task**: Owns the cursor and the encoder (write half)
//! - **Receive task**: Owns the decoder (read half) and feeds a bounded queue
//! - **Drain**: The caller's task dequeues replies, checks ordering and reassembles
//!
//! The halves are disjoint, so the connection itself needs no lock. The queue is
//! sized to the number of chunks the stream will produce.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::audio::{AudioMetadata, SampleBuffer, SampleStreamCursor};
use crate::error::{Stage, StageError, StreamError, StreamResult};
use crate::protocol::{Chunk, ChunkDecoder, ChunkEncoder, Decoded};

/// Current status of a streaming session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    /// Chunks are still being sent
    Sending,
    /// All chunks sent; waiting for the remaining replies
    AwaitingDrain,
    /// Transfer completed successfully
    Closed,
    /// Transfer aborted
    Failed(String),
}

impl SessionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SessionStatus::Sending => "sending",
            SessionStatus::AwaitingDrain => "awaiting_drain",
            SessionStatus::Closed => "closed",
            SessionStatus::Failed(_) => "failed",
        }
    }
}

/// Cloneable view of a session's status.
///
/// Taken with [`StreamingSession::status_handle`] before `run`, which consumes
/// the session. The send task and the session write through the same cell.
#[derive(Debug, Clone)]
pub struct SessionStatusHandle(Arc<Mutex<SessionStatus>>);

impl SessionStatusHandle {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(SessionStatus::Sending)))
    }

    pub fn get(&self) -> SessionStatus {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn set(&self, status: SessionStatus) {
        debug!(status = status.as_str(), "Session status changed");
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = status;
    }
}

/// Result of a completed transfer.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub metadata: AudioMetadata,
    pub chunks_sent: usize,
    pub chunks_received: usize,
    pub total_frames: usize,
    pub chunk_frames: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,

    /// Processed samples, reassembled in chunk-id order
    pub processed: SampleBuffer,
}

/// Connect to the server, tagging failures with the dial stage.
pub async fn dial(addr: &str) -> Result<TcpStream, StageError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(StageError::at(Stage::Dial))?;
    // Chunks are flushed one message at a time
    stream.set_nodelay(true).map_err(StageError::at(Stage::Dial))?;
    Ok(stream)
}

/// Client side of one transfer.
pub struct StreamingSession {
    session_id: Uuid,
    cursor: SampleStreamCursor,
    chunk_frames: usize,
    status: SessionStatusHandle,
}

impl StreamingSession {
    /// Create a session over parsed audio.
    ///
    /// ## Errors:
    /// `Config` if `chunk_frames` is zero.
    pub fn new(metadata: AudioMetadata, buffer: SampleBuffer, chunk_frames: usize) -> StreamResult<Self> {
        if chunk_frames == 0 {
            return Err(StreamError::Config(
                "chunk size must be at least one frame".to_string(),
            ));
        }

        Ok(Self {
            session_id: Uuid::new_v4(),
            cursor: SampleStreamCursor::new(metadata, buffer),
            chunk_frames,
            status: SessionStatusHandle::new(),
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status.get()
    }

    /// Handle that keeps reporting status after the session is moved into `run`.
    pub fn status_handle(&self) -> SessionStatusHandle {
        self.status.clone()
    }

    /// Number of replies the transfer must produce: `ceil(total_frames / chunk_frames)`.
    pub fn expected_chunks(&self) -> usize {
        self.cursor.chunk_count(self.chunk_frames)
    }

    /// Run the transfer over a TCP connection.
    pub async fn run(self, stream: TcpStream) -> Result<SessionOutcome, StageError> {
        let (reader, writer) = stream.into_split();
        self.run_on(reader, writer).await
    }

    /// Run the transfer over any pair of stream halves.
    ///
    /// Both tasks are joined before this returns, so the halves are released
    /// by the time the caller sees the outcome.
    pub async fn run_on<R, W>(self, reader: R, writer: W) -> Result<SessionOutcome, StageError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let span = info_span!("session", session_id = %self.session_id);
        let status = self.status.clone();
        let result = self.drive(reader, writer).instrument(span).await;

        match &result {
            Ok(_) => status.set(SessionStatus::Closed),
            Err(err) => status.set(SessionStatus::Failed(err.to_string())),
        }
        result
    }

    async fn drive<R, W>(self, reader: R, writer: W) -> Result<SessionOutcome, StageError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();

        let metadata = *self.cursor.metadata();
        let total_frames = self.cursor.total_frames();
        let frame_size = self.cursor.frame_size();
        let chunk_frames = self.chunk_frames;
        let expected = self.expected_chunks();

        info!(
            total_frames,
            chunk_frames,
            expected_chunks = expected,
            sample_rate = metadata.sample_rate,
            channels = metadata.channels,
            bit_depth = metadata.bit_depth,
            "Starting transfer"
        );

        let (queue_tx, queue_rx) = mpsc::channel::<Chunk>(expected.max(1));

        let send_task = tokio::spawn(
            send_loop(self.cursor, chunk_frames, ChunkEncoder::new(writer), self.status.clone())
                .in_current_span(),
        );
        let receive_task = tokio::spawn(
            receive_loop(ChunkDecoder::new(reader), queue_tx, expected).in_current_span(),
        );

        let plan = ReplyPlan {
            metadata,
            total_frames,
            chunk_frames,
        };
        let drained = drain_replies(queue_rx, plan, frame_size).await;
        if drained.is_err() {
            receive_task.abort();
            send_task.abort();
        }

        let received = joined(receive_task.await, Stage::Decode);
        if !matches!(received, Some(Ok(_))) {
            send_task.abort();
        }
        let sent = joined(send_task.await, Stage::Encode);

        // A send failure is reported first: it usually causes the receive side to fail too
        let chunks_sent = match sent {
            Some(Ok(count)) => count,
            Some(Err(err)) => return Err(err),
            None => 0,
        };
        let chunks_received = match received {
            Some(Ok(count)) => count,
            Some(Err(err)) => return Err(err),
            None => 0,
        };
        let processed = drained?;

        if chunks_received != expected {
            return Err(StageError::new(
                Stage::Decode,
                StreamError::Protocol(format!(
                    "server closed after {} replies, expected {}",
                    chunks_received, expected
                )),
            ));
        }

        let elapsed_ms = clock.elapsed().as_millis() as u64;
        info!(chunks_sent, chunks_received, total_frames, elapsed_ms, "Transfer complete");

        Ok(SessionOutcome {
            session_id: self.session_id,
            metadata,
            chunks_sent,
            chunks_received,
            total_frames,
            chunk_frames,
            started_at,
            elapsed_ms,
            processed,
        })
    }
}

/// Map a joined task result. `None` means the task was cancelled by us.
fn joined(
    result: Result<Result<usize, StageError>, JoinError>,
    stage: Stage,
) -> Option<Result<usize, StageError>> {
    match result {
        Ok(inner) => Some(inner),
        Err(err) if err.is_cancelled() => None,
        Err(err) => Some(Err(StageError::new(
            stage,
            StreamError::Internal(format!("{} task failed: {}", stage, err)),
        ))),
    }
}

async fn send_loop<W: AsyncWrite + Unpin>(
    mut cursor: SampleStreamCursor,
    chunk_frames: usize,
    mut encoder: ChunkEncoder<W>,
    status: SessionStatusHandle,
) -> Result<usize, StageError> {
    let metadata = *cursor.metadata();
    let mut sent = 0usize;

    loop {
        let step = cursor.advance(chunk_frames);
        if !step.bytes.is_empty() {
            let chunk = Chunk::new(metadata, step.chunk_id, step.bytes.to_vec());
            encoder
                .encode(&chunk)
                .await
                .map_err(StageError::at(Stage::Encode))?;
            debug!(chunk_id = step.chunk_id, frames = step.frames, "Sent chunk");
            sent += 1;
        }
        if step.is_eof {
            break;
        }
    }

    // Half-close: the server answers the remaining chunks, then closes its side
    encoder.finish().await.map_err(StageError::at(Stage::Encode))?;
    status.set(SessionStatus::AwaitingDrain);
    debug!(sent, "All chunks sent, awaiting drain");
    Ok(sent)
}

async fn receive_loop<R: AsyncRead + Unpin>(
    mut decoder: ChunkDecoder<R>,
    queue: mpsc::Sender<Chunk>,
    expected: usize,
) -> Result<usize, StageError> {
    let mut received = 0usize;

    loop {
        match decoder.decode().await.map_err(StageError::at(Stage::Decode))? {
            Decoded::Chunk(chunk) => {
                if received >= expected {
                    return Err(StageError::new(
                        Stage::Decode,
                        StreamError::Protocol(format!(
                            "unexpected reply {} after all {} replies arrived",
                            chunk.chunk_id, expected
                        )),
                    ));
                }
                received += 1;
                if queue.send(chunk).await.is_err() {
                    warn!("Reply queue closed, stopping receive loop");
                    break;
                }
            }
            Decoded::StreamClosed => {
                debug!(received, "Server closed its side");
                break;
            }
        }
    }

    Ok(received)
}

/// What the replies must look like, derived from the cursor before sending.
#[derive(Debug, Clone, Copy)]
struct ReplyPlan {
    metadata: AudioMetadata,
    total_frames: usize,
    chunk_frames: usize,
}

impl ReplyPlan {
    /// Frames in chunk `chunk_id` of a full pass.
    fn frames_for(&self, chunk_id: u64) -> usize {
        let start = (chunk_id as usize).saturating_mul(self.chunk_frames);
        self.total_frames.saturating_sub(start).min(self.chunk_frames)
    }
}

/// Dequeue replies until the receive task finishes, checking order and size.
async fn drain_replies(
    mut queue: mpsc::Receiver<Chunk>,
    plan: ReplyPlan,
    frame_size: usize,
) -> Result<SampleBuffer, StageError> {
    let protocol = |msg: String| StageError::new(Stage::Decode, StreamError::Protocol(msg));
    let mut processed =
        SampleBuffer::with_capacity(frame_size, plan.total_frames).map_err(StageError::at(Stage::Decode))?;
    let mut next_id = 0u64;

    while let Some(reply) = queue.recv().await {
        if reply.chunk_id != next_id {
            return Err(protocol(format!(
                "reply out of order: expected chunk {}, got {}",
                next_id, reply.chunk_id
            )));
        }
        if reply.metadata != plan.metadata {
            return Err(protocol(format!(
                "reply {} changed the audio format",
                reply.chunk_id
            )));
        }
        let expected_frames = plan.frames_for(reply.chunk_id);
        if reply.frames() != expected_frames {
            return Err(protocol(format!(
                "reply {} has {} frames, sent {}",
                reply.chunk_id,
                reply.frames(),
                expected_frames
            )));
        }

        processed
            .append_frames(&reply.samples)
            .map_err(StageError::at(Stage::Decode))?;
        debug!(chunk_id = reply.chunk_id, frames = expected_frames, "Received processed chunk");
        next_id += 1;
    }

    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::WAVE_FORMAT_PCM;
    use crate::audio::GainProcessor;
    use std::time::Duration;
    use tokio::io::{duplex, split};

    fn mono16(frames: usize) -> (AudioMetadata, SampleBuffer) {
        let metadata = AudioMetadata::new(8000, 1, 16, WAVE_FORMAT_PCM);
        let bytes = (0..frames)
            .flat_map(|i| (((i % 100) as i16 - 50) * 100).to_le_bytes())
            .collect();
        (metadata, SampleBuffer::new(bytes, 2).unwrap())
    }

    /// Minimal in-process peer: applies the gain and echoes each chunk, then half-closes.
    async fn echo_peer<S: AsyncRead + AsyncWrite + Unpin>(stream: S, gain_db: f64) {
        let processor = GainProcessor::new(gain_db).unwrap();
        let (reader, writer) = split(stream);
        let mut decoder = ChunkDecoder::new(reader);
        let mut encoder = ChunkEncoder::new(writer);
        while let Decoded::Chunk(chunk) = decoder.decode().await.unwrap() {
            encoder.encode(&processor.process(&chunk).unwrap()).await.unwrap();
        }
        encoder.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_round_trip_at_zero_gain() {
        let (metadata, buffer) = mono16(10_000);
        let original = buffer.clone();
        let session = StreamingSession::new(metadata, buffer, 4096).unwrap();
        assert_eq!(session.expected_chunks(), 3);
        assert_eq!(session.status(), SessionStatus::Sending);

        let (client, server) = duplex(8 * 1024);
        let peer = tokio::spawn(echo_peer(server, 0.0));
        let (reader, writer) = split(client);

        let outcome = session.run_on(reader, writer).await.unwrap();
        peer.await.unwrap();

        assert_eq!(outcome.chunks_sent, 3);
        assert_eq!(outcome.chunks_received, 3);
        assert_eq!(outcome.total_frames, 10_000);
        assert_eq!(outcome.processed, original);
    }

    #[tokio::test]
    async fn test_empty_stream_sends_nothing() {
        let (metadata, buffer) = mono16(0);
        let session = StreamingSession::new(metadata, buffer, 512).unwrap();
        assert_eq!(session.expected_chunks(), 0);

        let (client, server) = duplex(1024);
        let peer = tokio::spawn(echo_peer(server, 6.0));
        let (reader, writer) = split(client);

        let outcome = session.run_on(reader, writer).await.unwrap();
        peer.await.unwrap();
        assert_eq!(outcome.chunks_sent, 0);
        assert!(outcome.processed.is_empty());
    }

    #[tokio::test]
    async fn test_missing_replies_are_a_decode_error() {
        let (metadata, buffer) = mono16(100);
        let session = StreamingSession::new(metadata, buffer, 10).unwrap();
        let status = session.status_handle();

        let (client, server) = duplex(64 * 1024);
        // Peer that answers only the first chunk, then closes
        let peer = tokio::spawn(async move {
            let (reader, writer) = split(server);
            let mut decoder = ChunkDecoder::new(reader);
            let mut encoder = ChunkEncoder::new(writer);
            let mut answered = false;
            while let Decoded::Chunk(chunk) = decoder.decode().await.unwrap() {
                if !answered {
                    encoder.encode(&chunk).await.unwrap();
                    answered = true;
                }
            }
            encoder.finish().await.unwrap();
        });
        let (reader, writer) = split(client);

        let err = session.run_on(reader, writer).await.unwrap_err();
        peer.await.unwrap();
        assert_eq!(err.stage, Stage::Decode);
        assert!(matches!(err.source, StreamError::Protocol(_)), "{}", err);
        assert!(
            matches!(status.get(), SessionStatus::Failed(ref msg) if msg.starts_with("decode stage failed")),
            "{:?}",
            status.get()
        );
        assert_eq!(status.get().as_str(), "failed");
    }

    #[tokio::test]
    async fn test_status_moves_through_drain_to_closed() {
        let (metadata, buffer) = mono16(300);
        let session = StreamingSession::new(metadata, buffer, 100).unwrap();
        let status = session.status_handle();
        let observed = status.clone();

        let (client, server) = duplex(64 * 1024);
        // Peer holds every reply until the client has closed its write half
        let peer = tokio::spawn(async move {
            let (reader, writer) = split(server);
            let mut decoder = ChunkDecoder::new(reader);
            let mut encoder = ChunkEncoder::new(writer);
            let mut held = Vec::new();
            while let Decoded::Chunk(chunk) = decoder.decode().await.unwrap() {
                held.push(chunk);
            }

            let mut seen = observed.get();
            for _ in 0..200 {
                if seen == SessionStatus::AwaitingDrain {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                seen = observed.get();
            }

            for chunk in &held {
                encoder.encode(chunk).await.unwrap();
            }
            encoder.finish().await.unwrap();
            seen
        });
        let (reader, writer) = split(client);

        session.run_on(reader, writer).await.unwrap();
        assert_eq!(peer.await.unwrap(), SessionStatus::AwaitingDrain);
        assert_eq!(status.get(), SessionStatus::Closed);
        assert_eq!(status.get().as_str(), "closed");
    }

    #[tokio::test]
    async fn test_peer_dropping_mid_transfer_fails_encode() {
        let (metadata, buffer) = mono16(10_000);
        let session = StreamingSession::new(metadata, buffer, 100).unwrap();

        // Small pipe so the client is still writing when the peer goes away
        let (client, server) = duplex(256);
        let peer = tokio::spawn(async move {
            let mut decoder = ChunkDecoder::new(server);
            assert!(matches!(decoder.decode().await.unwrap(), Decoded::Chunk(_)));
        });
        let (reader, writer) = split(client);

        let result = tokio::time::timeout(Duration::from_secs(5), session.run_on(reader, writer))
            .await
            .expect("session did not finish");
        peer.await.unwrap();

        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::Encode);
        assert!(matches!(err.source, StreamError::Transport(_)), "{}", err);
    }

    #[tokio::test]
    async fn test_out_of_order_reply_rejected() {
        let (metadata, buffer) = mono16(40);
        let session = StreamingSession::new(metadata, buffer, 10).unwrap();

        let (client, server) = duplex(64 * 1024);
        let peer = tokio::spawn(async move {
            let (reader, writer) = split(server);
            let mut decoder = ChunkDecoder::new(reader);
            let mut encoder = ChunkEncoder::new(writer);
            while let Ok(Decoded::Chunk(mut chunk)) = decoder.decode().await {
                chunk.chunk_id += 1;
                if encoder.encode(&chunk).await.is_err() {
                    break;
                }
            }
            let _ = encoder.finish().await;
        });
        let (reader, writer) = split(client);

        let err = session.run_on(reader, writer).await.unwrap_err();
        let _ = peer.await;
        assert!(err.to_string().contains("out of order"), "{}", err);
    }

    #[test]
    fn test_zero_chunk_frames_rejected() {
        let (metadata, buffer) = mono16(10);
        assert!(StreamingSession::new(metadata, buffer, 0).is_err());
    }

    #[test]
    fn test_reply_plan_frames() {
        let plan = ReplyPlan {
            metadata: AudioMetadata::new(8000, 1, 16, WAVE_FORMAT_PCM),
            total_frames: 10_000,
            chunk_frames: 4096,
        };
        assert_eq!(plan.frames_for(0), 4096);
        assert_eq!(plan.frames_for(1), 4096);
        assert_eq!(plan.frames_for(2), 1808);
        assert_eq!(plan.frames_for(3), 0);
    }
}
