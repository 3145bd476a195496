//! GRBL status report parsing.
//!
//! A status report is a single line wrapped in angle brackets, with
//! pipe-separated fields:
//!
//! ```text
//! <Idle|MPos:10.000,5.000,0.000|WPos:0.000,0.000,0.000|FS:1000,0>
//!  ^^^^ ^^^^^^^^^^^^^^^^^^^^^^^ ^^^^^^^^^^^^^^^^^^^^^^ ^^^^^^^^^
//!  state  machine position      work position          feed, speed
//! ```
//!
//! The state token must be one of the [`MachineStatus`] variants.  Field
//! order is not significant, unknown fields are skipped, and a field whose
//! payload does not parse is treated as absent so the caller keeps its
//! previous value.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::state::{MachineStatus, Position};

/// Errors returned by [`parse_status_report`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatusError {
    /// The line is not wrapped in `<...>`; it is free text such as `ok`.
    #[error("not a status report")]
    NotAStatusReport,

    /// The line is a status report but its state token is not recognised.
    #[error("malformed status report: unknown state token {token:?}")]
    MalformedStatus { token: String },
}

/// Feed rate and spindle speed from an `FS:` field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedSpeed {
    pub feed: f64,
    pub speed: f64,
}

impl FeedSpeed {
    /// Parses the `feed,speed` payload of an `FS:` field.
    ///
    /// Exactly two finite numeric values are required.
    pub fn parse_csv(text: &str) -> Option<Self> {
        let mut parts = text
            .split(',')
            .map(|s| s.trim().parse::<f64>().ok().filter(|v| v.is_finite()));
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Some(feed)), Some(Some(speed)), None) => Some(Self { feed, speed }),
            _ => None,
        }
    }
}

/// The state delta carried by one status report.
///
/// `None` fields were absent (or unparseable) in the report and must not
/// overwrite existing state.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: MachineStatus,
    pub mpos: Option<Position>,
    pub wpos: Option<Position>,
    pub feed_speed: Option<FeedSpeed>,
}

impl StatusReport {
    /// Re-serializes the report in GRBL shorthand.
    ///
    /// Numbers are written with Rust's shortest round-trip formatting, so
    /// `parse_status_report(&report.to_line())` yields an identical report.
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(64);
        line.push('<');
        line.push_str(self.status.as_str());
        if let Some(p) = self.mpos {
            let _ = write!(line, "|MPos:{},{},{}", p.x, p.y, p.z);
        }
        if let Some(p) = self.wpos {
            let _ = write!(line, "|WPos:{},{},{}", p.x, p.y, p.z);
        }
        if let Some(fs) = self.feed_speed {
            let _ = write!(line, "|FS:{},{}", fs.feed, fs.speed);
        }
        line.push('>');
        line
    }
}

/// Returns `true` if the (trimmed) line has the `<...>` status envelope.
pub fn is_status_envelope(line: &str) -> bool {
    let line = line.trim();
    line.len() >= 2 && line.starts_with('<') && line.ends_with('>')
}

/// Parses a single status report line.
///
/// # Errors
///
/// - [`StatusError::NotAStatusReport`] for any line without the `<...>`
///   envelope.  Callers forward such lines verbatim.
/// - [`StatusError::MalformedStatus`] when the state token is not a known
///   [`MachineStatus`].  No partial report is produced.
///
/// # Example
///
/// ```rust
/// use grbl_core::{parse_status_report, MachineStatus, Position};
///
/// let report = parse_status_report("<Run|MPos:1,2,3|FS:500,0>").unwrap();
/// assert_eq!(report.status, MachineStatus::Run);
/// assert_eq!(report.mpos, Some(Position::new(1.0, 2.0, 3.0)));
/// assert_eq!(report.wpos, None);
/// ```
pub fn parse_status_report(line: &str) -> Result<StatusReport, StatusError> {
    let line = line.trim();
    if !is_status_envelope(line) {
        return Err(StatusError::NotAStatusReport);
    }

    let content = &line[1..line.len() - 1];
    let mut segments = content.split('|');

    // `split` always yields at least one segment, possibly empty.
    let token = segments.next().unwrap_or_default();
    let status: MachineStatus = token.parse()?;

    let mut report = StatusReport {
        status,
        mpos: None,
        wpos: None,
        feed_speed: None,
    };

    for segment in segments {
        let Some((key, value)) = segment.split_once(':') else {
            continue;
        };
        match key {
            "MPos" => report.mpos = Position::parse_csv(value),
            "WPos" => report.wpos = Position::parse_csv(value),
            "FS" => report.feed_speed = FeedSpeed::parse_csv(value),
            _ => {}
        }
    }

    Ok(report)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_report() {
        // Arrange
        let line = "<Idle|MPos:10.000,5.000,-1.250|WPos:0.000,0.000,0.000|FS:1000,250>";

        // Act
        let report = parse_status_report(line).unwrap();

        // Assert
        assert_eq!(report.status, MachineStatus::Idle);
        assert_eq!(report.mpos, Some(Position::new(10.0, 5.0, -1.25)));
        assert_eq!(report.wpos, Some(Position::ORIGIN));
        assert_eq!(
            report.feed_speed,
            Some(FeedSpeed {
                feed: 1000.0,
                speed: 250.0
            })
        );
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        let report = parse_status_report("  <Run|MPos:1,2,3>\r").unwrap();
        assert_eq!(report.status, MachineStatus::Run);
    }

    #[test]
    fn test_non_finite_fields_are_absent() {
        // Arrange
        let line = "<Idle|MPos:nan,inf,0|WPos:1,2,3|FS:inf,0>";

        // Act
        let report = parse_status_report(line).unwrap();

        // Assert: only the finite field survives
        assert_eq!(report.mpos, None);
        assert_eq!(report.wpos, Some(Position::new(1.0, 2.0, 3.0)));
        assert_eq!(report.feed_speed, None);
    }

    #[test]
    fn test_parse_status_only() {
        let report = parse_status_report("<Alarm>").unwrap();
        assert_eq!(report.status, MachineStatus::Alarm);
        assert_eq!(report.mpos, None);
        assert_eq!(report.wpos, None);
        assert_eq!(report.feed_speed, None);
    }

    #[test]
    fn test_parse_hold_substate() {
        let report = parse_status_report("<Hold:0|MPos:0,0,0>").unwrap();
        assert_eq!(report.status, MachineStatus::Hold);
    }

    #[test]
    fn test_parse_unknown_token_is_malformed() {
        let err = parse_status_report("<BadToken|MPos:1,2,3>").unwrap_err();
        assert_eq!(
            err,
            StatusError::MalformedStatus {
                token: "BadToken".to_string()
            }
        );
    }

    #[test]
    fn test_parse_empty_envelope_is_malformed() {
        assert!(matches!(
            parse_status_report("<>"),
            Err(StatusError::MalformedStatus { .. })
        ));
    }

    #[test]
    fn test_plain_lines_are_not_status_reports() {
        for line in ["ok", "error:20", "ALARM:1", "", "<", "Grbl 1.1h ['$' for help]", "[MSG:Caution: Unlocked]"] {
            assert_eq!(
                parse_status_report(line),
                Err(StatusError::NotAStatusReport),
                "line {line:?}"
            );
        }
    }

    #[test]
    fn test_short_mpos_is_skipped() {
        let report = parse_status_report("<Idle|MPos:1,2|WPos:4,5,6>").unwrap();
        assert_eq!(report.mpos, None);
        assert_eq!(report.wpos, Some(Position::new(4.0, 5.0, 6.0)));
    }

    #[test]
    fn test_non_numeric_wpos_is_skipped() {
        let report = parse_status_report("<Idle|WPos:a,b,c>").unwrap();
        assert_eq!(report.wpos, None);
    }

    #[test]
    fn test_fs_requires_exactly_two_values() {
        assert_eq!(parse_status_report("<Idle|FS:100>").unwrap().feed_speed, None);
        assert_eq!(parse_status_report("<Idle|FS:1,2,3>").unwrap().feed_speed, None);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let report = parse_status_report("<Run|MPos:1,2,3|Bf:15,128|Ln:99|Ov:100,100,100|FS:10,0>").unwrap();
        assert_eq!(report.mpos, Some(Position::new(1.0, 2.0, 3.0)));
        assert_eq!(
            report.feed_speed,
            Some(FeedSpeed {
                feed: 10.0,
                speed: 0.0
            })
        );
    }

    #[test]
    fn test_to_line_round_trips() {
        let report = StatusReport {
            status: MachineStatus::Run,
            mpos: Some(Position::new(12.345, -0.001, 3.0)),
            wpos: Some(Position::new(0.1, 0.2, 0.3)),
            feed_speed: Some(FeedSpeed {
                feed: 1500.5,
                speed: 12000.0,
            }),
        };

        let parsed = parse_status_report(&report.to_line()).unwrap();

        assert_eq!(parsed, report);
    }

    #[test]
    fn test_to_line_omits_absent_fields() {
        let report = StatusReport {
            status: MachineStatus::Idle,
            mpos: None,
            wpos: None,
            feed_speed: None,
        };
        assert_eq!(report.to_line(), "<Idle>");
    }
}
