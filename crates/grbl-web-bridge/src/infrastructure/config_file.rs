//! Optional TOML configuration file.
//!
//! Every key is optional; anything missing keeps its built-in default, so an
//! empty file is valid.  Command-line flags and environment variables are
//! applied on top of the result in `main.rs`.
//!
//! ```toml
//! [bridge]
//! ws_bind = "0.0.0.0"
//! ws_port = 5000
//! mode = "serial"            # serial | tcp | simulated
//! log_level = "info"
//! client_queue_depth = 256
//! reconnect_backoff_ms = 1000
//!
//! [grbl]
//! device = "/dev/ttyUSB0"
//! baud_rate = 115200
//! tcp_host = "127.0.0.1"
//! tcp_port = 3333
//! sim_ack_delay_ms = 30
//!
//! [streaming]
//! ok_idle_timeout_ms = 1500
//! command_idle_timeout_ms = 5000
//!
//! [air]
//! override_force = false
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use grbl_core::IdleTimeouts;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{BridgeConfig, BridgeMode};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Schema ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub bridge: BridgeSection,
    pub grbl: GrblSection,
    pub streaming: StreamingSection,
    pub air: AirSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeSection {
    #[serde(default = "default_ws_bind")]
    pub ws_bind: String,
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    #[serde(default)]
    pub mode: BridgeMode,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_client_queue_depth")]
    pub client_queue_depth: usize,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrblSection {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_tcp_host")]
    pub tcp_host: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default = "default_sim_ack_delay_ms")]
    pub sim_ack_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingSection {
    #[serde(default = "default_ok_idle_timeout_ms")]
    pub ok_idle_timeout_ms: u64,
    #[serde(default = "default_command_idle_timeout_ms")]
    pub command_idle_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirSection {
    #[serde(default)]
    pub override_force: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_ws_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_ws_port() -> u16 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_client_queue_depth() -> usize {
    256
}
fn default_reconnect_backoff_ms() -> u64 {
    1000
}
fn default_device() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_tcp_host() -> String {
    "127.0.0.1".to_string()
}
fn default_tcp_port() -> u16 {
    3333
}
fn default_sim_ack_delay_ms() -> u64 {
    30
}
fn default_ok_idle_timeout_ms() -> u64 {
    1500
}
fn default_command_idle_timeout_ms() -> u64 {
    5000
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            ws_bind: default_ws_bind(),
            ws_port: default_ws_port(),
            mode: BridgeMode::default(),
            log_level: default_log_level(),
            client_queue_depth: default_client_queue_depth(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
        }
    }
}

impl Default for GrblSection {
    fn default() -> Self {
        Self {
            device: default_device(),
            baud_rate: default_baud_rate(),
            tcp_host: default_tcp_host(),
            tcp_port: default_tcp_port(),
            sim_ack_delay_ms: default_sim_ack_delay_ms(),
        }
    }
}

impl Default for StreamingSection {
    fn default() -> Self {
        Self {
            ok_idle_timeout_ms: default_ok_idle_timeout_ms(),
            command_idle_timeout_ms: default_command_idle_timeout_ms(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl FileConfig {
    /// Parses TOML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the file at `path`.  Unlike the defaults-only case, a
    /// missing file is an error: the user asked for it explicitly.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Validates the file contents and converts them to a [`BridgeConfig`].
    pub fn into_bridge_config(self) -> Result<BridgeConfig, ConfigError> {
        let ip: IpAddr = self.bridge.ws_bind.parse().map_err(|_| ConfigError::Invalid {
            field: "bridge.ws_bind",
            reason: format!("'{}' is not an IP address", self.bridge.ws_bind),
        })?;
        if self.bridge.client_queue_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "bridge.client_queue_depth",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(BridgeConfig {
            ws_bind_addr: SocketAddr::new(ip, self.bridge.ws_port),
            mode: self.bridge.mode,
            serial_device: self.grbl.device,
            baud_rate: self.grbl.baud_rate,
            tcp_host: self.grbl.tcp_host,
            tcp_port: self.grbl.tcp_port,
            reconnect_backoff: Duration::from_millis(self.bridge.reconnect_backoff_ms),
            idle: IdleTimeouts {
                after_ok: Duration::from_millis(self.streaming.ok_idle_timeout_ms),
                after_command: Duration::from_millis(self.streaming.command_idle_timeout_ms),
            },
            sim_ack_delay: Duration::from_millis(self.grbl.sim_ack_delay_ms),
            client_queue_depth: self.bridge.client_queue_depth,
            air_override_force: self.air.override_force,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_matches_builtin_defaults() {
        // Arrange / Act
        let config = FileConfig::parse("").unwrap().into_bridge_config().unwrap();

        // Assert
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let text = r#"
            [bridge]
            mode = "tcp"

            [grbl]
            tcp_host = "lightburn.local"
        "#;

        let file = FileConfig::parse(text).unwrap();
        assert_eq!(file.bridge.log_level, "info");
        let config = file.into_bridge_config().unwrap();

        assert_eq!(config.mode, BridgeMode::Tcp);
        assert_eq!(config.tcp_host, "lightburn.local");
        assert_eq!(config.tcp_port, 3333);
        assert_eq!(config.ws_bind_addr.port(), 5000);
    }

    #[test]
    fn test_full_file() {
        let text = r#"
            [bridge]
            ws_bind = "127.0.0.1"
            ws_port = 8080
            mode = "simulated"
            log_level = "debug"
            client_queue_depth = 16
            reconnect_backoff_ms = 250

            [grbl]
            device = "/dev/ttyACM0"
            baud_rate = 250000
            sim_ack_delay_ms = 5

            [streaming]
            ok_idle_timeout_ms = 100
            command_idle_timeout_ms = 200

            [air]
            override_force = true
        "#;

        let config = FileConfig::parse(text).unwrap().into_bridge_config().unwrap();

        assert_eq!(config.ws_bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.mode, BridgeMode::Simulated);
        assert_eq!(config.serial_device, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 250_000);
        assert_eq!(config.reconnect_backoff, Duration::from_millis(250));
        assert_eq!(config.idle.after_ok, Duration::from_millis(100));
        assert_eq!(config.idle.after_command, Duration::from_millis(200));
        assert_eq!(config.sim_ack_delay, Duration::from_millis(5));
        assert_eq!(config.client_queue_depth, 16);
        assert!(config.air_override_force);
    }

    #[test]
    fn test_unknown_mode_is_parse_error() {
        let result = FileConfig::parse("[bridge]\nmode = \"usb\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_bad_bind_address_is_rejected() {
        let file = FileConfig::parse("[bridge]\nws_bind = \"not.an.ip\"\n").unwrap();
        let err = file.into_bridge_config().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "bridge.ws_bind", .. }));
    }

    #[test]
    fn test_zero_queue_depth_is_rejected() {
        let file = FileConfig::parse("[bridge]\nclient_queue_depth = 0\n").unwrap();
        assert!(file.into_bridge_config().is_err());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let path = Path::new("/nonexistent/grbl-bridge.toml");
        let err = FileConfig::load(path).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/grbl-bridge.toml"));
    }
}
