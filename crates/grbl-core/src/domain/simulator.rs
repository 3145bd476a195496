//! A very small GRBL machine model for running the bridge without hardware.
//!
//! The model is deliberately shallow: moves complete instantly, there is no
//! planner and no soft limits.  It tracks just enough for a dashboard to show
//! plausible numbers while jogging:
//!
//! - `?` returns a status report, followed by the usual `ok`.
//! - `G90` / `G91` switch between absolute and relative distance mode.
//! - Lines with `X`/`Y`/`Z` words (including `$J=` jogs) move the machine.
//! - `$H` homes all axes to zero.
//! - `G10 L20 P1 X<v>` sets the work offset so the work coordinate becomes `v`.

use tracing::trace;

use crate::domain::state::Position;

/// What the simulated controller answers to a line.
#[derive(Debug, Clone, PartialEq)]
pub enum SimReply {
    /// Plain `ok` acknowledgement.
    Ack,
    /// A status report line (answer to `?`), acknowledged like any other
    /// command.
    Status(String),
}

impl SimReply {
    /// The lines the controller sends back, in order.
    pub fn into_lines(self) -> Vec<String> {
        match self {
            SimReply::Ack => vec!["ok".to_string()],
            SimReply::Status(line) => vec![line, "ok".to_string()],
        }
    }
}

/// Simulated machine state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedMachine {
    mpos: Position,
    work_offset: Position,
    relative: bool,
}

impl SimulatedMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current machine position.
    pub fn mpos(&self) -> Position {
        self.mpos
    }

    /// Current work position (`mpos - work_offset`).
    pub fn wpos(&self) -> Position {
        self.mpos.minus(self.work_offset)
    }

    /// The status report GRBL would produce for the current state.
    pub fn status_line(&self) -> String {
        let m = self.mpos;
        let w = self.wpos();
        format!(
            "<Idle|MPos:{:.3},{:.3},{:.3}|WPos:{:.3},{:.3},{:.3}|FS:0,0>",
            m.x, m.y, m.z, w.x, w.y, w.z
        )
    }

    /// Feeds one command line to the machine and returns its reply.
    pub fn respond(&mut self, line: &str) -> SimReply {
        let line = line.trim();
        if line == "?" {
            return SimReply::Status(self.status_line());
        }

        let upper = line.to_ascii_uppercase();
        if upper.starts_with("$H") {
            self.mpos = Position::ORIGIN;
        } else if let Some(jog) = upper.strip_prefix("$J=") {
            let words = words(jog);
            let relative = if has_word(&words, 'G', 91.0) {
                true
            } else if has_word(&words, 'G', 90.0) {
                false
            } else {
                self.relative
            };
            self.apply_move(&words, relative);
        } else if !upper.starts_with('$') {
            self.apply_gcode(&words(&upper));
        }

        SimReply::Ack
    }

    fn apply_gcode(&mut self, words: &[(char, f64)]) {
        if has_word(words, 'G', 10.0) {
            if has_word(words, 'L', 20.0) {
                for &(letter, value) in words {
                    if let Some(current) = self.mpos.axis(letter) {
                        self.work_offset = self.work_offset.with_axis(letter, current - value);
                    }
                }
            }
            return;
        }

        if has_word(words, 'G', 91.0) {
            self.relative = true;
        } else if has_word(words, 'G', 90.0) {
            self.relative = false;
        }
        self.apply_move(words, self.relative);
    }

    fn apply_move(&mut self, words: &[(char, f64)], relative: bool) {
        for &(letter, value) in words {
            if let Some(current) = self.mpos.axis(letter) {
                let target = if relative { current + value } else { value };
                self.mpos = self.mpos.with_axis(letter, target);
            }
        }
        trace!(mpos = ?self.mpos, "simulated move");
    }
}

fn has_word(words: &[(char, f64)], letter: char, value: f64) -> bool {
    words.iter().any(|&(l, v)| l == letter && v == value)
}

/// Splits an upper-cased G-code line into `(letter, value)` words.
///
/// Whitespace is optional (`G91X10` and `G91 X10` are equivalent).  Letters
/// without a parseable number are skipped, as is anything after a `;` or
/// inside parentheses.
fn words(line: &str) -> Vec<(char, f64)> {
    let mut out = Vec::new();
    let mut chars = line.chars().peekable();
    let mut in_comment = false;

    while let Some(c) = chars.next() {
        match c {
            ';' => break,
            '(' => in_comment = true,
            ')' => in_comment = false,
            _ if in_comment => {}
            letter if letter.is_ascii_alphabetic() => {
                let mut number = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_digit() || matches!(next, '.' | '-' | '+') {
                        number.push(next);
                        chars.next();
                    } else if next == ' ' && number.is_empty() {
                        chars.next();
                    } else {
                        break;
                    }
                }
                if let Ok(value) = number.parse::<f64>() {
                    out.push((letter, value));
                }
            }
            _ => {}
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
