//! # Configuration Management
//!
//! Loads the server configuration from multiple sources:
//! - Built-in defaults
//! - TOML configuration file (`config.toml`, optional)
//! - Environment variables (with `APP_` prefix, `__` between levels)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platform convention)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_PROCESSING__GAIN_DB`, ...)
//! 3. Configuration file (`config.toml`)
//! 4. Default values (defined in the Default impl)
//!
//! ## Rust Concepts:
//! - **Serde**: The same structs are serialized (to seed the defaults) and deserialized (final result)
//! - **Builder pattern**: Sources are stacked on `config::Config::builder()` in priority order

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::{StreamError, StreamResult};

/// Default TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 42069;

/// Allowed gain range in decibels.
pub const GAIN_DB_RANGE: std::ops::RangeInclusive<f64> = -120.0..=60.0;

/// Main server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub processing: ProcessingConfig,
}

/// Listener settings.
///
/// ## Fields:
/// - `host`: Address to bind ("0.0.0.0" for every interface, "127.0.0.1" for local only)
/// - `port`: TCP port
/// - `max_concurrent_connections`: Connections handled at once; further clients wait to be accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_concurrent_connections: usize,
}

/// Audio processing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Gain applied to every chunk, in decibels
    pub gain_db: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
                max_concurrent_connections: 64,
            },
            processing: ProcessingConfig {
                gain_db: 6.0,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from every source in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=127.0.0.1`: Override bind host
    /// - `APP_SERVER__MAX_CONCURRENT_CONNECTIONS=8`: Override the admission cap
    /// - `APP_PROCESSING__GAIN_DB=-3.5`: Override the gain
    /// - `PORT=9000`: Special case for deployment platforms
    pub fn load() -> StreamResult<Self> {
        Self::load_from("config")
    }

    /// Same as [`AppConfig::load`] with an explicit config file name (extension optional).
    pub fn load_from(file: &str) -> StreamResult<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - At least one concurrent connection is allowed
    /// - Gain is finite and within [`GAIN_DB_RANGE`]
    pub fn validate(&self) -> StreamResult<()> {
        if self.server.port == 0 {
            return Err(StreamError::Config("Server port cannot be 0".to_string()));
        }

        if self.server.max_concurrent_connections == 0 {
            return Err(StreamError::Config(
                "Max concurrent connections must be greater than 0".to_string(),
            ));
        }

        let gain = self.processing.gain_db;
        if !gain.is_finite() || !GAIN_DB_RANGE.contains(&gain) {
            return Err(StreamError::Config(format!(
                "Gain must be between {} and {} dB, got {}",
                GAIN_DB_RANGE.start(),
                GAIN_DB_RANGE.end(),
                gain
            )));
        }

        Ok(())
    }

    /// `host:port` string for binding the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
