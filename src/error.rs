//! # Error Handling
//!
//! Error types shared by the client and the server.
//!
//! ## Error Categories:
//! - **Format**: The WAV input is malformed (bad tags, missing data chunk, zero frame size)
//! - **Transport**: The connection failed (refused, reset, read/write error)
//! - **Codec**: A wire message was malformed or truncated
//! - **Protocol**: The peer broke the round-trip discipline (wrong reply id or count)
//! - **Config**: Configuration values are invalid
//!
//! A clean end of stream is *not* an error. The decoder reports it as
//! [`crate::protocol::Decoded::StreamClosed`] so callers can tell "done" from "broken".
//!
//! ## Rust Concepts:
//! - **thiserror**: Derives `std::error::Error` and `Display` from the `#[error(...)]` attributes
//! - **#[from]**: Generates a `From` impl so `?` converts `io::Error` automatically

use std::fmt;
use thiserror::Error;

/// Error type for every fallible operation in the crate.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Malformed WAV input. Fatal before any transfer starts.
    #[error("Format error: {0}")]
    Format(String),

    /// Connection refused, reset, or a read/write failure
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Malformed or truncated message framing
    #[error("Codec error: {0}")]
    Codec(String),

    /// Peer replied out of order, with the wrong frame count, or with the wrong number of replies
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration file or environment variable problems
    #[error("Configuration error: {0}")]
    Config(String),

    /// A background task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for StreamError {
    fn from(err: config::ConfigError) -> Self {
        StreamError::Config(err.to_string())
    }
}

/// Stage of a client transfer, used to name what failed in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Dial,
    Encode,
    Decode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Parse => "parse",
            Stage::Dial => "dial",
            Stage::Encode => "encode",
            Stage::Decode => "decode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`StreamError`] tagged with the stage it happened in.
///
/// ## Usage Example:
/// ```ignore
/// let meta = read_wav_file(path).map_err(StageError::at(Stage::Parse))?;
/// ```
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: StreamError,
}

impl StageError {
    pub fn new(stage: Stage, source: impl Into<StreamError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// Returns a closure for use with `map_err`.
    pub fn at<E: Into<StreamError>>(stage: Stage) -> impl FnOnce(E) -> StageError {
        move |err| StageError::new(stage, err)
    }
}

/// Shorthand for `Result<T, StreamError>`.
pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_names_stage() {
        let err = StageError::new(Stage::Decode, StreamError::Codec("truncated".to_string()));
        assert_eq!(err.to_string(), "decode stage failed: Codec error: truncated");
    }

    #[test]
    fn test_io_error_converts_to_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: StreamError = io.into();
        assert!(matches!(err, StreamError::Transport(_)));
    }
}
