//! grbl-web-bridge library crate.
//!
//! Shares a single GRBL-style CNC/laser controller between many browser
//! dashboards.  The bridge owns the controller link, relays every controller
//! line to every client, forwards client commands to the controller, and
//! keeps a parsed runtime state that it broadcasts as JSON after each change.
//!
//! # Architecture
//!
//! ```text
//! Browsers (text over WebSocket)
//!         ↕
//! [grbl-web-bridge]
//!   ├── domain/           BridgeConfig, ClientId, ClientFrame, LinkEvent
//!   ├── application/      hub (owns RuntimeState) + broadcaster
//!   └── infrastructure/
//!         ├── ws_server/  accept loop and per-client tasks
//!         ├── supervisor/ keeps the controller link open, reconnects
//!         ├── transport/  serial, TCP and simulated controllers
//!         └── config_file TOML settings
//!         ↕
//! GRBL controller (line protocol over serial or TCP)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async runtime.
//! - `application` uses channels and timers but never opens a socket or a
//!   device.
//! - `infrastructure` depends on everything else.

/// Domain layer: configuration and message types.
pub mod domain;

/// Application layer: the hub and the client broadcaster.
pub mod application;

/// Infrastructure layer: WebSocket server, transports, link supervision.
pub mod infrastructure;
