//! # WAV Gain Stream
//!
//! Streams linear PCM from a WAV file to a server, which applies a decibel gain
//! to each chunk and streams the processed audio back.
//!
//! ## Architecture:
//! - **audio**: WAV parsing, frame-aligned chunking, gain transform
//! - **protocol**: Chunk messages and their framing on the wire
//! - **session**: Client side of one transfer (concurrent send and receive)
//! - **connection**: Server side of one connection (decode → gain → encode)
//! - **server**: Admission-controlled accept loop
//! - **state**: Server counters
//! - **config**: Layered server configuration
//! - **error**: Error types
//! - **telemetry**: Logging setup for the binaries

pub mod audio;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod state;
pub mod telemetry;

pub use error::{Stage, StageError, StreamError, StreamResult};
