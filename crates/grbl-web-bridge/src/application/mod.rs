//! Application layer for grbl-web-bridge.
//!
//! Decides what happens in response to client commands and controller
//! traffic.  It owns the runtime state and the client registry but never
//! touches a socket or a serial port: input arrives as [`HubEvent`]s and
//! output leaves through channels that the infrastructure layer drains.

pub mod broadcaster;
pub mod hub;

pub use broadcaster::{BroadcastReport, Broadcaster, Delivery};
pub use hub::{BridgeHub, HubEvent, HubStats, BUSY_NOTICE};
