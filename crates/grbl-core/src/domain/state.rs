//! Runtime machine state.
//!
//! [`RuntimeState`] is the single aggregate the bridge keeps about the
//! controller and its clients.  It is serialized wholesale to JSON and pushed
//! to every WebSocket client after each mutation, so its serde field names are
//! part of the browser-facing protocol:
//!
//! ```json
//! {"status":"Idle","mpos":{"x":0.0,"y":0.0,"z":0.0},"wpos":{"x":0.0,"y":0.0,"z":0.0},
//!  "feed":0.0,"speed":0.0,"client_connected":true,"streaming":false,
//!  "air_state":false,"air_override_force":false,"serial_device":"/dev/ttyUSB0"}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::protocol::status::{StatusError, StatusReport};

// ── Position ──────────────────────────────────────────────────────────────────

/// A three-axis position in millimetres.
///
/// `Position` is a `Copy` value type.  Status reports replace a position
/// wholesale; individual axes are never patched in place.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    /// The machine origin.
    pub const ORIGIN: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Creates a position from its three components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Parses the `x,y,z` payload of an `MPos:` or `WPos:` field.
    ///
    /// Returns `None` when fewer than three fields are present or when any
    /// field is not a number.  Controllers with rotary axes report more than
    /// three values; only the first three are kept.
    ///
    /// # Example
    ///
    /// ```rust
    /// use grbl_core::Position;
    ///
    /// assert_eq!(Position::parse_csv("1.5,-2,0.25"), Some(Position::new(1.5, -2.0, 0.25)));
    /// assert_eq!(Position::parse_csv("1.5,-2"), None);
    /// ```
    pub fn parse_csv(text: &str) -> Option<Self> {
        // `f64::from_str` also accepts `nan` and `inf`; those are not positions.
        let coords = text
            .split(',')
            .map(|s| s.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
            .collect::<Option<Vec<f64>>>()?;

        match coords.as_slice() {
            [x, y, z, ..] => Some(Self::new(*x, *y, *z)),
            _ => None,
        }
    }

    /// Returns the component for an axis letter (`X`, `Y` or `Z`, any case).
    pub fn axis(&self, letter: char) -> Option<f64> {
        match letter.to_ascii_uppercase() {
            'X' => Some(self.x),
            'Y' => Some(self.y),
            'Z' => Some(self.z),
            _ => None,
        }
    }

    /// Returns a copy with the component for `letter` replaced by `value`.
    ///
    /// Non-axis letters leave the position unchanged.
    pub fn with_axis(self, letter: char, value: f64) -> Self {
        match letter.to_ascii_uppercase() {
            'X' => Self { x: value, ..self },
            'Y' => Self { y: value, ..self },
            'Z' => Self { z: value, ..self },
            _ => self,
        }
    }

    /// Component-wise subtraction (`self - other`).
    pub fn minus(self, other: Position) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

// ── MachineStatus ─────────────────────────────────────────────────────────────

/// The controller state, as reported in the first segment of a status report.
///
/// The set is closed: a status report carrying any other token is rejected by
/// the parser.  `Disconnected` and `Connecting` are never sent by a controller
/// but are set by the bridge itself while the transport link is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MachineStatus {
    #[default]
    Disconnected,
    Connecting,
    Idle,
    Run,
    Alarm,
    Hold,
    Door,
    Check,
    Home,
}

impl MachineStatus {
    /// All variants, in declaration order.
    pub const ALL: [MachineStatus; 9] = [
        MachineStatus::Disconnected,
        MachineStatus::Connecting,
        MachineStatus::Idle,
        MachineStatus::Run,
        MachineStatus::Alarm,
        MachineStatus::Hold,
        MachineStatus::Door,
        MachineStatus::Check,
        MachineStatus::Home,
    ];

    /// The wire token for this status (`"Idle"`, `"Run"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Disconnected => "Disconnected",
            MachineStatus::Connecting => "Connecting",
            MachineStatus::Idle => "Idle",
            MachineStatus::Run => "Run",
            MachineStatus::Alarm => "Alarm",
            MachineStatus::Hold => "Hold",
            MachineStatus::Door => "Door",
            MachineStatus::Check => "Check",
            MachineStatus::Home => "Home",
        }
    }

    /// Returns `true` while the bridge has a working controller link.
    pub fn is_linked(&self) -> bool {
        !matches!(self, MachineStatus::Disconnected | MachineStatus::Connecting)
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineStatus {
    type Err = StatusError;

    /// Parses a status token.
    ///
    /// GRBL 1.1 appends a sub-state code to some states (`Hold:0`, `Door:1`);
    /// the code is accepted and discarded.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let name = token.split(':').next().unwrap_or_default().trim();
        MachineStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == name)
            .ok_or_else(|| StatusError::MalformedStatus {
                token: token.to_string(),
            })
    }
}

// ── RuntimeState ──────────────────────────────────────────────────────────────

/// Everything the bridge knows about the machine and its clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    pub status: MachineStatus,
    pub mpos: Position,
    pub wpos: Position,
    pub feed: f64,
    pub speed: f64,
    pub client_connected: bool,
    pub streaming: bool,
    /// Logical air-assist state, driven by `M7`/`M8`/`M9` commands.
    pub air_state: bool,
    /// Air assist is under manual control; neither M-codes nor streaming
    /// transitions change `air_state`.
    pub air_override_force: bool,
    /// Label of the active transport (device path, `tcp:host:port`, or `simulated`).
    pub serial_device: String,
}

impl RuntimeState {
    /// Creates the startup state: disconnected, at the origin, no clients.
    pub fn new(serial_device: impl Into<String>, air_override_force: bool) -> Self {
        Self {
            status: MachineStatus::Disconnected,
            mpos: Position::ORIGIN,
            wpos: Position::ORIGIN,
            feed: 0.0,
            speed: 0.0,
            client_connected: false,
            streaming: false,
            air_state: false,
            air_override_force,
            serial_device: serial_device.into(),
        }
    }

    /// Applies a parsed status report.
    ///
    /// The status token is always replaced.  `mpos`, `wpos` and the
    /// feed/speed pair are replaced only when the report carried them;
    /// missing fields keep their previous values.
    pub fn apply_report(&mut self, report: &StatusReport) {
        self.status = report.status;
        if let Some(mpos) = report.mpos {
            self.mpos = mpos;
        }
        if let Some(wpos) = report.wpos {
            self.wpos = wpos;
        }
        if let Some(fs) = report.feed_speed {
            self.feed = fs.feed;
            self.speed = fs.speed;
        }
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new("", false)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::status::FeedSpeed;

    #[test]
    fn test_parse_csv_three_values() {
        assert_eq!(
            Position::parse_csv("10.000,-5.5,0"),
            Some(Position::new(10.0, -5.5, 0.0))
        );
    }

    #[test]
    fn test_parse_csv_extra_axes_are_ignored() {
        // Four-axis controllers append the A axis.
        assert_eq!(
            Position::parse_csv("1,2,3,90"),
            Some(Position::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn test_parse_csv_rejects_non_finite_values() {
        assert_eq!(Position::parse_csv("nan,inf,0"), None);
        assert_eq!(Position::parse_csv("1,-infinity,0"), None);
        assert_eq!(Position::parse_csv("1,2,NaN"), None);
    }

    #[test]
    fn test_parse_csv_too_few_fields_is_none() {
        assert_eq!(Position::parse_csv("1,2"), None);
    }

    #[test]
    fn test_parse_csv_non_numeric_is_none() {
        assert_eq!(Position::parse_csv("1,abc,3"), None);
        assert_eq!(Position::parse_csv(""), None);
    }

    #[test]
    fn test_with_axis_replaces_single_component() {
        let p = Position::new(1.0, 2.0, 3.0).with_axis('y', 9.0);
        assert_eq!(p, Position::new(1.0, 9.0, 3.0));
        assert_eq!(p.axis('Y'), Some(9.0));
        assert_eq!(p.axis('A'), None);
    }

    #[test]
    fn test_machine_status_round_trips_through_str() {
        for status in MachineStatus::ALL {
            assert_eq!(status.as_str().parse::<MachineStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_machine_status_accepts_substate_suffix() {
        assert_eq!("Hold:0".parse::<MachineStatus>().unwrap(), MachineStatus::Hold);
        assert_eq!("Door:1".parse::<MachineStatus>().unwrap(), MachineStatus::Door);
    }

    #[test]
    fn test_machine_status_rejects_unknown_token() {
        let err = "Jogging".parse::<MachineStatus>().unwrap_err();
        assert!(matches!(err, StatusError::MalformedStatus { ref token } if token == "Jogging"));
    }

    #[test]
    fn test_machine_status_is_case_sensitive() {
        assert!("idle".parse::<MachineStatus>().is_err());
    }

    #[test]
    fn test_new_state_is_disconnected_at_origin() {
        let state = RuntimeState::new("/dev/ttyUSB0", false);
        assert_eq!(state.status, MachineStatus::Disconnected);
        assert_eq!(state.mpos, Position::ORIGIN);
        assert_eq!(state.wpos, Position::ORIGIN);
        assert!(!state.client_connected);
        assert!(!state.streaming);
        assert_eq!(state.serial_device, "/dev/ttyUSB0");
    }

    #[test]
    fn test_apply_report_keeps_missing_fields() {
        // Arrange
        let mut state = RuntimeState::new("sim", false);
        state.wpos = Position::new(7.0, 8.0, 9.0);
        state.feed = 500.0;
        let report = StatusReport {
            status: MachineStatus::Run,
            mpos: Some(Position::new(1.0, 2.0, 3.0)),
            wpos: None,
            feed_speed: None,
        };

        // Act
        state.apply_report(&report);

        // Assert
        assert_eq!(state.status, MachineStatus::Run);
        assert_eq!(state.mpos, Position::new(1.0, 2.0, 3.0));
        assert_eq!(state.wpos, Position::new(7.0, 8.0, 9.0));
        assert_eq!(state.feed, 500.0);
    }

    #[test]
    fn test_apply_report_sets_feed_and_speed() {
        let mut state = RuntimeState::default();
        state.apply_report(&StatusReport {
            status: MachineStatus::Idle,
            mpos: None,
            wpos: None,
            feed_speed: Some(FeedSpeed {
                feed: 1200.0,
                speed: 8000.0,
            }),
        });
        assert_eq!(state.feed, 1200.0);
        assert_eq!(state.speed, 8000.0);
    }

    #[test]
    fn test_runtime_state_json_field_names() {
        let state = RuntimeState::new("/dev/ttyACM0", true);
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["status"], "Disconnected");
        assert_eq!(json["mpos"]["x"], 0.0);
        assert_eq!(json["client_connected"], false);
        assert_eq!(json["streaming"], false);
        assert_eq!(json["air_override_force"], true);
        assert_eq!(json["serial_device"], "/dev/ttyACM0");
    }
}
