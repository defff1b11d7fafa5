//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/ds1000z.toml` (base configuration)
//! 2. Environment variables prefixed with `DS1000Z_`, nested with `__`
//!    (e.g. `DS1000Z_TRANSPORT__HOST=192.168.1.50`)
//!
//! Missing sections fall back to defaults, so an empty or absent file yields a
//! usable mock setup.
//!
//! # Example
//! ```no_run
//! use ds1000z_scpi::config::ScopeConfig;
//!
//! let config = ScopeConfig::load()?;
//! println!("Scope at {}:{}", config.transport.host, config.transport.port);
//! # Ok::<(), ds1000z_scpi::ScpiError>(())
//! ```

use crate::error::{ScpiError, ScpiResult};
use crate::sequencer::BusyPolicy;
use crate::transport::tcp::{DEFAULT_PORT, DEFAULT_TIMEOUT_MS};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/ds1000z.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DS1000Z_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// How to reach the instrument
    pub transport: TransportConfig,
    /// Sequencer settings
    pub session: SessionConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "ds1000z".to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

/// Transport selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Raw SCPI socket
    Tcp,
    /// In-memory instrument
    #[default]
    Mock,
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Transport kind
    pub kind: TransportKind,
    /// Instrument host name or address
    pub host: String,
    /// SCPI socket port
    pub port: u16,
    /// Response timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Mock,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl TransportConfig {
    /// Response timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Sequencer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// What a second caller gets while the transport is busy
    pub busy_policy: BusyPolicy,
}

impl ScopeConfig {
    /// Load configuration from `config/ds1000z.toml` and environment variables
    pub fn load() -> ScpiResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> ScpiResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(ScopeConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> ScpiResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ScpiError::Config(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(ScpiError::Config(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.transport.kind == TransportKind::Tcp {
            if self.transport.host.trim().is_empty() {
                return Err(ScpiError::Config(
                    "transport.host is required for tcp transport".to_string(),
                ));
            }
            if self.transport.port == 0 {
                return Err(ScpiError::Config("transport.port must be non-zero".to_string()));
            }
        }

        if self.transport.timeout_ms == 0 {
            return Err(ScpiError::Config(
                "transport.timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
