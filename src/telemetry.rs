//! # Logging Setup
//!
//! Installs the `tracing` subscriber used by both binaries. Library code only
//! emits events through `tracing` macros; which of them are shown, and where,
//! is decided here by the binary.
//!
//! ## Environment Variables:
//! - `RUST_LOG`: Controls what gets logged (e.g. "debug", "wav_gain_stream=trace")
//! - If not set, the binary's default filter is used

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging to stderr.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}
