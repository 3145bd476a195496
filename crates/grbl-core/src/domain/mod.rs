//! Domain entities for the GRBL bridge.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies: no sockets, no serial ports, no async runtime.  Time is
//! passed in explicitly as [`std::time::Instant`] values so the streaming
//! detector can be tested without sleeping.

/// Machine position, status token, and the aggregate runtime state.
pub mod state;

/// Idle/streaming inference driven by command and acknowledgement traffic.
pub mod streaming;

/// Minimal machine model behind the simulated transport.
pub mod simulator;
