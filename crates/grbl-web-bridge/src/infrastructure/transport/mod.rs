//! Controller links.
//!
//! A [`Transport`] is one way of reaching a GRBL controller: a serial device,
//! a TCP socket, or the in-process simulator.  The link supervisor only ever
//! sees the trait, so all three are reconnected, framed and logged the same
//! way.
//!
//! # Contract
//!
//! - [`Transport::open`] establishes the link and returns a channel of
//!   complete, trimmed, non-empty lines from the controller.  The channel
//!   closing means the link is gone.
//! - [`Transport::write`] sends one line, appending `\n` if missing.
//! - [`Transport::close`] releases the device; `open` may be called again
//!   afterwards.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::config::{BridgeConfig, BridgeMode};

pub mod serial;
pub mod simulated;
pub mod tcp;

pub use serial::SerialTransport;
pub use simulated::SimulatedTransport;
pub use tcp::TcpTransport;

/// Capacity of the line channel returned by [`Transport::open`].
pub const LINE_QUEUE_DEPTH: usize = 256;

/// Errors raised by a controller link.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The device or endpoint could not be opened.
    #[error("cannot open {target}: {reason}")]
    Unavailable { target: String, reason: String },

    /// `write` was called without a successful `open`.
    #[error("transport is not open")]
    NotOpen,

    /// The peer closed the link.
    #[error("transport closed by peer")]
    Closed,

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bidirectional, line-oriented link to a controller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Which kind of link this is.
    fn mode(&self) -> BridgeMode;

    /// Device path or endpoint, for logs and the runtime state.
    fn label(&self) -> String;

    /// Opens the link.
    async fn open(&mut self) -> Result<mpsc::Receiver<String>, TransportError>;

    /// Writes one command line.
    async fn write(&mut self, line: &str) -> Result<(), TransportError>;

    /// Closes the link.  Closing a link that is not open is a no-op.
    async fn close(&mut self);
}

/// Builds the transport selected by `config.mode`.
pub fn from_config(config: &BridgeConfig) -> Box<dyn Transport> {
    match config.mode {
        BridgeMode::Serial => Box::new(SerialTransport::new(
            config.serial_device.clone(),
            config.baud_rate,
        )),
        BridgeMode::Tcp => Box::new(TcpTransport::new(config.tcp_host.clone(), config.tcp_port)),
        BridgeMode::Simulated => Box::new(SimulatedTransport::new(config.sim_ack_delay)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_follows_mode() {
        let mut cfg = BridgeConfig::default();
        assert_eq!(from_config(&cfg).mode(), BridgeMode::Serial);
        assert_eq!(from_config(&cfg).label(), "/dev/ttyUSB0");

        cfg.mode = BridgeMode::Tcp;
        assert_eq!(from_config(&cfg).mode(), BridgeMode::Tcp);
        assert_eq!(from_config(&cfg).label(), cfg.link_label());

        cfg.mode = BridgeMode::Simulated;
        assert_eq!(from_config(&cfg).label(), "simulated");
    }

    #[test]
    fn test_unavailable_error_names_target() {
        let err = TransportError::Unavailable {
            target: "/dev/ttyACM9".into(),
            reason: "No such file or directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot open /dev/ttyACM9: No such file or directory"
        );
    }
}
