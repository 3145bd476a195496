//! Incremental line framing for byte-stream transports.
//!
//! Serial ports and TCP sockets deliver arbitrary chunks: a single `read()`
//! may return half a line, or several lines at once.  [`LineBuffer`]
//! accumulates bytes and hands back complete lines as they become available.

/// Accumulates raw bytes and splits them into lines.
///
/// Lines are terminated by `\n`; a preceding `\r` is tolerated.  Returned
/// lines are whitespace-trimmed and empty lines are dropped.  Invalid UTF-8 is
/// replaced rather than rejected.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every line completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }
        lines
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
