//! GRBL over a raw TCP socket.
//!
//! Used with network-attached controllers and with LightBurn's TCP bridge.
//! The socket is split: a reader task frames incoming bytes into lines with
//! [`LineBuffer`] and pushes them into the channel returned by `open`, while
//! writes go straight to the owned write half.
//!
//! TCP is a stream protocol, so one `read()` may carry half a line or
//! several; the buffer takes care of both.

use async_trait::async_trait;
use grbl_core::protocol::{terminate_line, LineBuffer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Transport, TransportError, LINE_QUEUE_DEPTH};
use crate::domain::config::BridgeMode;

pub struct TcpTransport {
    host: String,
    port: u16,
    writer: Option<OwnedWriteHalf>,
    reader: Option<JoinHandle<()>>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            writer: None,
            reader: None,
        }
    }

    fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn mode(&self) -> BridgeMode {
        BridgeMode::Tcp
    }

    fn label(&self) -> String {
        format!("tcp:{}:{}", self.host, self.port)
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<String>, TransportError> {
        self.close().await;

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| TransportError::Unavailable {
                target: self.label(),
                reason: e.to_string(),
            })?;
        // Command lines are tiny; don't let Nagle batch them.
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(LINE_QUEUE_DEPTH);
        let label = self.label();
        self.reader = Some(tokio::spawn(read_lines(read_half, tx, label)));
        self.writer = Some(write_half);
        Ok(rx)
    }

    async fn write(&mut self, line: &str) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::NotOpen)?;
        let line = terminate_line(line);
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            self.writer = None;
            return Err(e.into());
        }
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        self.stop_reader();
    }
}

/// Reads from the socket until EOF or an error, forwarding each complete
/// line.  Dropping `tx` on return is what tells the supervisor the link is
/// gone.
async fn read_lines(mut read_half: OwnedReadHalf, tx: mpsc::Sender<String>, label: String) {
    let mut framer = LineBuffer::new();
    let mut buf = vec![0u8; 4096];

    loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) => {
                debug!(endpoint = %label, "controller closed the connection (EOF)");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(endpoint = %label, "read from controller failed: {e}");
                return;
            }
        };

        for line in framer.push(&buf[..n]) {
            if tx.send(line).await.is_err() {
                debug!(endpoint = %label, "line channel closed; exiting reader");
                return;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
