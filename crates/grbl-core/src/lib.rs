//! # grbl-core
//!
//! Shared library for the GRBL WebSocket bridge containing the controller line
//! protocol, the runtime-state model, and the streaming detector.
//!
//! Nothing in this crate performs I/O.  Sockets, serial ports, timers and
//! WebSocket sessions live in `grbl-web-bridge`; this crate only decides what
//! the bytes mean and how the machine state changes in response to them.
//!
//! # Architecture overview
//!
//! A GRBL-style controller speaks a plain-text, newline-delimited protocol.
//! Commands go down as single lines (`G0 X10`, `$H`, `?`) and the controller
//! answers with short acknowledgements (`ok`, `error:20`) interleaved with
//! periodic status reports (`<Idle|MPos:0.000,0.000,0.000|FS:0,0>`).
//!
//! - **`protocol`** – How lines on the wire are recognised: status-report
//!   parsing, response classification, command classification, and the
//!   incremental line splitter used by the byte-stream transports.
//!
//! - **`domain`** – The state the bridge keeps about the machine:
//!   [`RuntimeState`], the idle/streaming state machine ([`StreamTracker`]) and
//!   a small machine model used by the simulated transport.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `grbl_core::RuntimeState` instead of `grbl_core::domain::state::RuntimeState`.
pub use domain::simulator::{SimReply, SimulatedMachine};
pub use domain::state::{MachineStatus, Position, RuntimeState};
pub use domain::streaming::{IdleTimeouts, StreamTracker, StreamTransition};
pub use protocol::response::{classify_response, Response};
pub use protocol::status::{parse_status_report, FeedSpeed, StatusError, StatusReport};
