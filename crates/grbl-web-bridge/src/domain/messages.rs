//! Messages exchanged between clients, the hub and the controller link.
//!
//! The WebSocket protocol is deliberately plain: every frame is UTF-8 text.
//!
//! ```text
//! Client → Bridge:  "G0 X10"                       one raw command line
//! Bridge → Client:  "ok" / "<Idle|MPos:...>"       raw controller line
//!                   {"status":"Idle","mpos":...}   runtime-state snapshot (JSON)
//!                   "ERROR: Bridge not connected"  bridge notice
//! ```
//!
//! A client tells a snapshot apart from a controller line by the leading
//! `{`; GRBL never emits one.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

// ── Client identity ───────────────────────────────────────────────────────────

/// Identifies one WebSocket connection for its whole lifetime.
///
/// A reconnecting browser gets a fresh id; nothing is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generates a random (v4) id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first group is plenty to tell sessions apart in a log line.
        let text = self.0.to_string();
        f.write_str(text.split('-').next().unwrap_or(&text))
    }
}

// ── Bridge → client ───────────────────────────────────────────────────────────

/// One outbound text frame.
///
/// The text is reference-counted so a broadcast to N clients clones a pointer
/// N times rather than the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// A line received from the controller, forwarded verbatim.
    Line(Arc<str>),
    /// A JSON snapshot of the runtime state.
    State(Arc<str>),
    /// A notice generated by the bridge itself.
    Notice(Arc<str>),
}

impl ClientFrame {
    pub fn line(text: impl Into<Arc<str>>) -> Self {
        ClientFrame::Line(text.into())
    }

    pub fn state(json: impl Into<Arc<str>>) -> Self {
        ClientFrame::State(json.into())
    }

    pub fn notice(text: impl Into<Arc<str>>) -> Self {
        ClientFrame::Notice(text.into())
    }

    /// The frame payload as sent on the wire.
    pub fn text(&self) -> &str {
        match self {
            ClientFrame::Line(t) | ClientFrame::State(t) | ClientFrame::Notice(t) => t,
        }
    }

    /// Short name of the frame kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Line(_) => "line",
            ClientFrame::State(_) => "state",
            ClientFrame::Notice(_) => "notice",
        }
    }
}

// ── Controller link → hub ─────────────────────────────────────────────────────

/// What the link supervisor reports to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// An open attempt is starting.
    Connecting,
    /// The link is open.  `label` names the device or endpoint in use, which
    /// may differ from the configured one after a fallback to simulation.
    Connected { label: String },
    /// The link dropped or an open attempt failed.
    Lost { reason: String },
    /// One complete line from the controller, already trimmed.
    Line(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
