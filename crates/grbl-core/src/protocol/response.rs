//! Classification of lines received from the controller.

use crate::protocol::status::is_status_envelope;

/// The kind of a line received from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// `ok`: the previous command was accepted.
    Ok,
    /// `error:<n>`: the previous command was rejected with code `n`.
    Error(u32),
    /// `ALARM:<n>`: the controller entered the alarm state.
    Alarm(u32),
    /// A `<...>` status report.
    StatusReport,
    /// Anything else: banners, `[MSG:...]` feedback, settings dumps.
    Other,
}

/// Classifies a single controller line.
///
/// Matching is done on the trimmed line.  `ok` must match exactly; a line
/// such as `okay` is [`Response::Other`].
pub fn classify_response(line: &str) -> Response {
    let line = line.trim();

    if line == "ok" {
        return Response::Ok;
    }
    if is_status_envelope(line) {
        return Response::StatusReport;
    }
    if let Some(code) = numbered(line, "error:") {
        return Response::Error(code);
    }
    if let Some(code) = numbered(line, "ALARM:") {
        return Response::Alarm(code);
    }
    Response::Other
}

fn numbered(line: &str, prefix: &str) -> Option<u32> {
    line.strip_prefix(prefix)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_is_recognised() {
        assert_eq!(classify_response("ok"), Response::Ok);
        assert_eq!(classify_response("ok\r"), Response::Ok);
        assert_eq!(classify_response("okay"), Response::Other);
    }

    #[test]
    fn test_error_and_alarm_codes() {
        assert_eq!(classify_response("error:20"), Response::Error(20));
        assert_eq!(classify_response("ALARM:9"), Response::Alarm(9));
        // GRBL 0.9 uses textual errors; they are not numbered.
        assert_eq!(classify_response("error: Bad number format"), Response::Other);
    }

    #[test]
    fn test_status_and_other() {
        assert_eq!(classify_response("<Idle|MPos:0,0,0>"), Response::StatusReport);
        assert_eq!(classify_response("[MSG:Caution: Unlocked]"), Response::Other);
        assert_eq!(classify_response("Grbl 1.1h ['$' for help]"), Response::Other);
    }
}
