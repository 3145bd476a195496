//! Domain layer for grbl-web-bridge.
//!
//! Plain types with no I/O: the bridge configuration and the messages that
//! flow between clients, the hub and the controller link.  No `tokio`,
//! sockets or serial ports appear here.

pub mod config;
pub mod messages;

pub use config::{BridgeConfig, BridgeMode, UnknownMode};
pub use messages::{ClientFrame, ClientId, LinkEvent};
