//! TOML-based configuration for the client.
//!
//! Every field has a serde default so the client works on first run without
//! a config file, and a partial file only overrides the keys it names.
//! Example:
//!
//! ```toml
//! [server]
//! host = "10.0.0.7"
//! port = 7033
//!
//! [session]
//! poll_interval_ms = 50
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionTuning;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub client: GeneralConfig,
}

/// Remote endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host name or IP of the remote endpoint.
    #[serde(default = "default_host")]
    pub host: String,
    /// UDP port of the remote endpoint.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Protocol timing and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Receiver credit advertised on outgoing packets.
    #[serde(default = "default_initial_window")]
    pub initial_window: u16,
    /// Listener receive timeout in milliseconds; bounds how long the
    /// background listener blocks before re-checking the session status.
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    /// Transport-level transmission attempts per datagram.
    #[serde(default = "default_send_retries")]
    pub send_retries: u32,
    /// Matcher poll attempts per response wait.
    #[serde(default = "default_poll_retries")]
    pub poll_retries: u32,
    /// Sleep between matcher polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Protocol-level retries for an unacknowledged data send.
    #[serde(default = "default_data_attempts")]
    pub data_attempts: u32,
}

/// General client behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7033
}
fn default_initial_window() -> u16 {
    1024
}
fn default_receive_timeout_ms() -> u64 {
    500
}
fn default_send_retries() -> u32 {
    5
}
fn default_poll_retries() -> u32 {
    10
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_data_attempts() -> u32 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            client: GeneralConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_window: default_initial_window(),
            receive_timeout_ms: default_receive_timeout_ms(),
            send_retries: default_send_retries(),
            poll_retries: default_poll_retries(),
            poll_interval_ms: default_poll_interval_ms(),
            data_attempts: default_data_attempts(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Loads the configuration from `path`, returning
    /// `ClientConfig::default()` if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system errors other than "not
    /// found" and [`ConfigError::Parse`] for malformed TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Ok(toml::from_str(&text)?)
    }
}

impl SessionConfig {
    /// Converts the file-level settings into the session's tuning knobs.
    pub fn tuning(&self) -> SessionTuning {
        SessionTuning {
            initial_window: self.initial_window,
            send_retries: self.send_retries,
            poll_retries: self.poll_retries,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            data_attempts: self.data_attempts,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
