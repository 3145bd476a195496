//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for runtime settings.  It is
//! assembled once at startup from defaults, an optional TOML file and the
//! command line (in that order of increasing precedence) and then handed to
//! the infrastructure layer by value.
//!
//! Nothing in this module reads the environment or the filesystem; that is
//! the job of `main.rs` and [`crate::infrastructure::config_file`].

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use grbl_core::IdleTimeouts;
use serde::{Deserialize, Serialize};

/// Which controller link the bridge owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// A USB/UART serial device.  Falls back to [`BridgeMode::Simulated`]
    /// when the device cannot be opened at startup.
    #[default]
    Serial,
    /// A raw TCP socket, e.g. LightBurn's GRBL-over-TCP bridge.
    Tcp,
    /// An in-process machine model; no hardware needed.
    Simulated,
}

impl BridgeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeMode::Serial => "serial",
            BridgeMode::Tcp => "tcp",
            BridgeMode::Simulated => "simulated",
        }
    }
}

impl fmt::Display for BridgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a mode name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown bridge mode '{0}' (expected serial, tcp or simulated)")]
pub struct UnknownMode(pub String);

impl FromStr for BridgeMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(BridgeMode::Serial),
            "tcp" | "lightburn" => Ok(BridgeMode::Tcp),
            "simulated" | "sim" => Ok(BridgeMode::Simulated),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use grbl_web_bridge::domain::{BridgeConfig, BridgeMode};
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 5000);
/// assert_eq!(cfg.mode, BridgeMode::Serial);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Address the WebSocket server listens on.
    pub ws_bind_addr: SocketAddr,

    /// Controller link type.
    pub mode: BridgeMode,

    /// Serial device path, used in [`BridgeMode::Serial`].
    pub serial_device: String,

    /// Serial baud rate.
    pub baud_rate: u32,

    /// Host of the GRBL TCP endpoint, used in [`BridgeMode::Tcp`].
    pub tcp_host: String,

    /// Port of the GRBL TCP endpoint.
    pub tcp_port: u16,

    /// Fixed delay between reconnect attempts after the link drops.
    pub reconnect_backoff: Duration,

    /// Streaming idle timeouts.
    pub idle: IdleTimeouts,

    /// How long the simulated controller waits before answering a line.
    pub sim_ack_delay: Duration,

    /// Per-client outbound queue length.  A client whose queue is full when
    /// a message is broadcast is disconnected.
    pub client_queue_depth: usize,

    /// Air assist is under manual control; the bridge never changes
    /// `air_state` on its own.
    pub air_override_force: bool,
}

impl BridgeConfig {
    /// Human-readable name of the configured controller link, as reported in
    /// the `serial_device` field of the runtime state.
    pub fn link_label(&self) -> String {
        match self.mode {
            BridgeMode::Serial => self.serial_device.clone(),
            BridgeMode::Tcp => format!("tcp:{}:{}", self.tcp_host, self.tcp_port),
            BridgeMode::Simulated => "simulated".to_string(),
        }
    }
}

impl Default for BridgeConfig {
    /// | Field              | Default          |
    /// |--------------------|------------------|
    /// | ws_bind_addr       | `0.0.0.0:5000`   |
    /// | mode               | serial           |
    /// | serial_device      | `/dev/ttyUSB0`   |
    /// | baud_rate          | 115200           |
    /// | tcp_host:tcp_port  | `127.0.0.1:3333` |
    /// | reconnect_backoff  | 1 s              |
    /// | idle               | 1.5 s / 5 s      |
    /// | sim_ack_delay      | 30 ms            |
    /// | client_queue_depth | 256              |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            mode: BridgeMode::Serial,
            serial_device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            tcp_host: "127.0.0.1".to_string(),
            tcp_port: 3333,
            reconnect_backoff: Duration::from_secs(1),
            idle: IdleTimeouts::default(),
            sim_ack_delay: Duration::from_millis(30),
            client_queue_depth: 256,
            air_override_force: false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
