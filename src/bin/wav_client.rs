//! # WAV Client
//!
//! Streams a WAV file to a gain server and collects the processed audio.
//!
//! ## Usage:
//! ```text
//! wav-client input.wav                       # localhost:42069, 2048-frame chunks
//! wav-client input.wav 10.0.0.5:42069 --chunk-frames 4096 --output louder.wav --json
//! ```
//!
//! On failure the stage that failed (parse, dial, encode, decode) is logged and
//! the process exits with status 1.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

use wav_gain_stream::audio::format::AudioMetadata;
use wav_gain_stream::audio::processor::peak_amplitude;
use wav_gain_stream::audio::wav::{read_wav_file, write_wav_file};
use wav_gain_stream::session::{dial, SessionOutcome, StreamingSession};
use wav_gain_stream::telemetry::init_tracing;
use wav_gain_stream::{Stage, StageError};

/// Command-line arguments for wav-client
#[derive(Parser, Debug)]
#[command(name = "wav-client")]
#[command(about = "Stream a WAV file through a gain server")]
#[command(version)]
struct Args {
    /// WAV file to stream
    wav_path: PathBuf,

    /// Server address as host:port
    #[arg(default_value = "localhost:42069", env = "WAV_CLIENT_SERVER")]
    server_addr: String,

    /// Frames per chunk
    #[arg(long, default_value_t = 2048, value_parser = clap::value_parser!(u32).range(1..))]
    chunk_frames: u32,

    /// Write the processed audio to this WAV file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print the transfer report as JSON
    #[arg(long)]
    json: bool,
}

/// Summary of one transfer, printed on success.
#[derive(Debug, Serialize)]
struct TransferReport {
    server_addr: String,
    chunks_sent: usize,
    chunks_received: usize,
    total_frames: usize,
    duration_seconds: f64,
    chunk_frames: usize,
    metadata: AudioMetadata,
    started_at: DateTime<Utc>,
    elapsed_ms: u64,
    input_peak: f64,
    output_peak: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing("wav_gain_stream=warn,wav_client=info")?;

    let args = Args::parse();

    let (outcome, input_peak) = match transfer(&args).await {
        Ok(done) => done,
        Err(err) => {
            error!(stage = %err.stage, error = %err.source, "Transfer failed");
            std::process::exit(1);
        }
    };

    let output_peak = peak_amplitude(outcome.processed.as_bytes(), outcome.metadata.bit_depth)
        .context("Failed to measure processed audio")?;

    if let Some(path) = &args.output {
        write_wav_file(path, &outcome.metadata, outcome.processed.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Processed audio written to {}", path.display());
    }

    let report = TransferReport {
        server_addr: args.server_addr.clone(),
        chunks_sent: outcome.chunks_sent,
        chunks_received: outcome.chunks_received,
        total_frames: outcome.total_frames,
        duration_seconds: outcome.metadata.duration_seconds(outcome.total_frames),
        chunk_frames: outcome.chunk_frames,
        metadata: outcome.metadata,
        started_at: outcome.started_at,
        elapsed_ms: outcome.elapsed_ms,
        input_peak,
        output_peak,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "sent {} chunks ({} frames total, {:.2}s) to {}",
            report.chunks_sent, report.total_frames, report.duration_seconds, report.server_addr
        );
    }

    Ok(())
}

/// Parse, dial and run the session. Returns the outcome and the input peak.
async fn transfer(args: &Args) -> Result<(SessionOutcome, f64), StageError> {
    let (metadata, buffer) = read_wav_file(&args.wav_path).map_err(StageError::at(Stage::Parse))?;
    let input_peak =
        peak_amplitude(buffer.as_bytes(), metadata.bit_depth).map_err(StageError::at(Stage::Parse))?;

    info!(
        path = %args.wav_path.display(),
        sample_rate = metadata.sample_rate,
        channels = metadata.channels,
        bit_depth = metadata.bit_depth,
        frames = buffer.frames(),
        "Parsed WAV file"
    );

    let session = StreamingSession::new(metadata, buffer, args.chunk_frames as usize)
        .map_err(StageError::at(Stage::Parse))?;

    let stream = dial(&args.server_addr).await?;
    info!(server = %args.server_addr, session_id = %session.session_id(), "Connected");

    let outcome = session.run(stream).await?;
    Ok((outcome, input_peak))
}
