//! Classification of commands sent by clients toward the controller.

use std::borrow::Cow;

/// Text notice broadcast to clients when a command arrives while the
/// controller link is down.
pub const NOT_CONNECTED_NOTICE: &str = "ERROR: Bridge not connected";

/// Returns `true` if `command` looks like job traffic: it starts with `$`,
/// `G` or `M` (case-insensitive).
///
/// Status polls (`?`), feed-hold (`!`) and cycle-start (`~`) do not match.
pub fn is_stream_trigger(command: &str) -> bool {
    matches!(
        command.trim_start().chars().next(),
        Some('$' | 'G' | 'g' | 'M' | 'm')
    )
}

/// Returns the air-assist state a command switches to, if any.
///
/// `M7` (mist) and `M8` (flood) switch air assist on, `M9` switches it off.
/// The code must not be followed by another digit, so `M80` is not `M8`.
pub fn air_assist_change(command: &str) -> Option<bool> {
    let upper = command.trim_start().to_ascii_uppercase();
    let rest = upper.strip_prefix('M')?;
    let mut chars = rest.chars();
    let code = chars.next()?;
    if chars.next().is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    match code {
        '7' | '8' => Some(true),
        '9' => Some(false),
        _ => None,
    }
}

/// Appends a `\n` terminator if the line does not already end with one.
pub fn terminate_line(line: &str) -> Cow<'_, str> {
    if line.ends_with('\n') {
        Cow::Borrowed(line)
    } else {
        Cow::Owned(format!("{line}\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_trigger_prefixes() {
        assert!(is_stream_trigger("$J=G91X10F1000"));
        assert!(is_stream_trigger("G0 X10"));
        assert!(is_stream_trigger("g1 x5"));
        assert!(is_stream_trigger("M3 S100"));
        assert!(is_stream_trigger("m5"));
        assert!(is_stream_trigger("$H"));
    }

    #[test]
    fn test_non_triggers() {
        assert!(!is_stream_trigger("?"));
        assert!(!is_stream_trigger("!"));
        assert!(!is_stream_trigger("~"));
        assert!(!is_stream_trigger("X10"));
        assert!(!is_stream_trigger(""));
    }

    #[test]
    fn test_air_assist_on_off() {
        assert_eq!(air_assist_change("M8"), Some(true));
        assert_eq!(air_assist_change("m7"), Some(true));
        assert_eq!(air_assist_change("M9"), Some(false));
        assert_eq!(air_assist_change("M8 S0"), Some(true));
    }

    #[test]
    fn test_air_assist_ignores_other_codes() {
        assert_eq!(air_assist_change("M80"), None);
        assert_eq!(air_assist_change("M3 S1000"), None);
        assert_eq!(air_assist_change("G0 X8"), None);
        assert_eq!(air_assist_change("M"), None);
    }

    #[test]
    fn test_terminate_line() {
        assert_eq!(terminate_line("G0 X1"), "G0 X1\n");
        assert_eq!(terminate_line("G0 X1\n"), "G0 X1\n");
        assert!(matches!(terminate_line("ok\n"), Cow::Borrowed(_)));
    }
}
