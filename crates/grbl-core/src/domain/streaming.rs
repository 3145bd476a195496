//! Idle/streaming inference.
//!
//! The bridge never sees a "job start" or "job end" marker; it infers that a
//! job is streaming from the traffic:
//!
//! ```text
//!            command starting with $ / G / M
//!   ┌──────┐ ───────────────────────────────▶ ┌───────────┐
//!   │ Idle │                                  │ Streaming │ ◀─┐ command: deadline = now + after_command
//!   └──────┘ ◀─────────────────────────────── └───────────┘ ──┘ ok:      deadline = now + after_ok
//!                  deadline elapsed
//! ```
//!
//! Two timeout lengths are used depending on what armed the deadline: a short
//! one after an `ok` from the controller (the burst has probably finished)
//! and a longer one after a client command with no `ok` yet (the round trip
//! is still pending).  The most recent trigger replaces any earlier deadline.
//!
//! [`StreamTracker`] holds no timer of its own.  The caller asks for
//! [`StreamTracker::deadline`], sleeps until then, and calls
//! [`StreamTracker::poll_expired`].

use std::time::{Duration, Instant};

use crate::protocol::command::is_stream_trigger;

/// Idle timeout lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleTimeouts {
    /// Armed by every `ok` seen while streaming.
    pub after_ok: Duration,
    /// Armed by every client command while streaming.
    pub after_command: Duration,
}

impl Default for IdleTimeouts {
    /// 1.5 s after `ok`, 5 s after a client command.
    fn default() -> Self {
        Self {
            after_ok: Duration::from_millis(1500),
            after_command: Duration::from_secs(5),
        }
    }
}

/// A change of the streaming flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTransition {
    /// `Idle -> Streaming`.
    Started,
    /// `Streaming -> Idle`.
    Ended,
}

impl StreamTransition {
    /// The streaming flag after this transition.
    pub fn is_streaming(self) -> bool {
        matches!(self, StreamTransition::Started)
    }
}

/// Two-state streaming detector.
#[derive(Debug, Clone)]
pub struct StreamTracker {
    timeouts: IdleTimeouts,
    deadline: Option<Instant>,
    streaming: bool,
}

impl StreamTracker {
    /// Creates an idle tracker.
    pub fn new(timeouts: IdleTimeouts) -> Self {
        Self {
            timeouts,
            deadline: None,
            streaming: false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// When the current streaming phase will end if nothing else happens.
    ///
    /// Always `None` while idle.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn timeouts(&self) -> IdleTimeouts {
        self.timeouts
    }

    /// Records a command forwarded from a client.
    ///
    /// Starts streaming if the command is job traffic and the tracker is idle.
    /// While streaming, every command re-arms the long deadline.
    pub fn on_client_command(&mut self, command: &str, now: Instant) -> Option<StreamTransition> {
        let transition = if !self.streaming && is_stream_trigger(command) {
            self.streaming = true;
            Some(StreamTransition::Started)
        } else {
            None
        };

        if self.streaming {
            self.deadline = Some(now + self.timeouts.after_command);
        }
        transition
    }

    /// Records an `ok` from the controller.  Re-arms the short deadline while
    /// streaming; ignored while idle.
    pub fn on_transport_ok(&mut self, now: Instant) {
        if self.streaming {
            self.deadline = Some(now + self.timeouts.after_ok);
        }
    }

    /// Ends streaming if the deadline has passed.
    pub fn poll_expired(&mut self, now: Instant) -> Option<StreamTransition> {
        match self.deadline {
            Some(deadline) if self.streaming && now >= deadline => self.force_idle(),
            _ => None,
        }
    }

    /// Ends streaming immediately (used on shutdown).
    pub fn force_idle(&mut self) -> Option<StreamTransition> {
        self.deadline = None;
        if self.streaming {
            self.streaming = false;
            Some(StreamTransition::Ended)
        } else {
            None
        }
    }
}

impl Default for StreamTracker {
    fn default() -> Self {
        Self::new(IdleTimeouts::default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
