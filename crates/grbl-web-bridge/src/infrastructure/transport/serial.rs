//! GRBL over a USB/UART serial device.
//!
//! The `serialport` crate is blocking, so the port is driven from a
//! dedicated reader thread.  The port is opened with a short read timeout;
//! each timeout gives the thread a chance to notice that the link was closed
//! or that nobody is listening any more.  Writes are small and go through
//! `spawn_blocking` on a cloned handle.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use grbl_core::protocol::{terminate_line, LineBuffer};
use serialport::SerialPort;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Transport, TransportError, LINE_QUEUE_DEPTH};
use crate::domain::config::BridgeMode;

/// Read timeout; bounds how long the reader thread takes to notice `close`.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

pub struct SerialTransport {
    device: String,
    baud_rate: u32,
    writer: Option<SharedPort>,
    stop: Arc<AtomicBool>,
}

impl SerialTransport {
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
            writer: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn stop_reader(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.writer = None;
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn mode(&self) -> BridgeMode {
        BridgeMode::Serial
    }

    fn label(&self) -> String {
        self.device.clone()
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<String>, TransportError> {
        self.stop_reader();

        let unavailable = |e: serialport::Error| TransportError::Unavailable {
            target: self.device.clone(),
            reason: e.to_string(),
        };
        let port = serialport::new(&self.device, self.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(unavailable)?;
        let reader = port.try_clone().map_err(unavailable)?;

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(LINE_QUEUE_DEPTH);
        let device = self.device.clone();
        let thread_stop = Arc::clone(&stop);
        thread::Builder::new()
            .name(format!("serial-reader {device}"))
            .spawn(move || read_lines(reader, tx, thread_stop, device))?;

        info!(device = %self.device, baud = self.baud_rate, "serial port opened");
        self.stop = stop;
        self.writer = Some(Arc::new(Mutex::new(port)));
        Ok(rx)
    }

    async fn write(&mut self, line: &str) -> Result<(), TransportError> {
        let port = self.writer.clone().ok_or(TransportError::NotOpen)?;
        let bytes = terminate_line(line).into_owned().into_bytes();

        let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut port = port
                .lock()
                .map_err(|e| std::io::Error::new(ErrorKind::Other, e.to_string()))?;
            port.write_all(&bytes)?;
            port.flush()
        })
        .await
        .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;

        if let Err(e) = result {
            self.stop_reader();
            return Err(e.into());
        }
        Ok(())
    }

    async fn close(&mut self) {
        if self.writer.is_some() {
            debug!(device = %self.device, "closing serial port");
        }
        self.stop_reader();
    }
}

/// Blocking read loop run on the reader thread.
///
/// Returns (dropping `tx`, which ends the line stream) on a read error, when
/// `stop` is set, or when the receiving side has gone away.
fn read_lines(
    mut port: Box<dyn SerialPort>,
    tx: mpsc::Sender<String>,
    stop: Arc<AtomicBool>,
    device: String,
) {
    let mut framer = LineBuffer::new();
    let mut buf = [0u8; 1024];

    while !stop.load(Ordering::Relaxed) {
        let n = match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                if tx.is_closed() {
                    break;
                }
                continue;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(%device, "serial read failed: {e}");
                break;
            }
        };

        for line in framer.push(&buf[..n]) {
            if tx.blocking_send(line).is_err() {
                debug!(%device, "line channel closed; exiting serial reader");
                return;
            }
        }
    }
    debug!(%device, "serial reader stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
