//! In-process controller for running without hardware.
//!
//! Each written line is fed to a [`SimulatedMachine`] immediately, and its
//! reply (`ok`, preceded by a status report for `?`) is handed to a pump task
//! that delivers it once the ack delay has elapsed since the write.  Two lines
//! written back to back therefore produce two replies roughly one delay
//! later, in write order.

use std::time::Duration;

use async_trait::async_trait;
use grbl_core::SimulatedMachine;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use super::{Transport, TransportError, LINE_QUEUE_DEPTH};
use crate::domain::config::BridgeMode;

pub struct SimulatedTransport {
    ack_delay: Duration,
    machine: SimulatedMachine,
    pending: Option<mpsc::Sender<(Instant, String)>>,
}

impl SimulatedTransport {
    pub fn new(ack_delay: Duration) -> Self {
        Self {
            ack_delay,
            machine: SimulatedMachine::new(),
            pending: None,
        }
    }

    pub fn machine(&self) -> &SimulatedMachine {
        &self.machine
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn mode(&self) -> BridgeMode {
        BridgeMode::Simulated
    }

    fn label(&self) -> String {
        "simulated".to_string()
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<String>, TransportError> {
        let (lines_tx, lines_rx) = mpsc::channel(LINE_QUEUE_DEPTH);
        let (pending_tx, mut pending_rx) = mpsc::channel::<(Instant, String)>(LINE_QUEUE_DEPTH);

        tokio::spawn(async move {
            while let Some((due, reply)) = pending_rx.recv().await {
                sleep_until(due).await;
                if lines_tx.send(reply).await.is_err() {
                    break;
                }
            }
        });

        self.pending = Some(pending_tx);
        debug!(delay_ms = self.ack_delay.as_millis() as u64, "simulated controller ready");
        Ok(lines_rx)
    }

    async fn write(&mut self, line: &str) -> Result<(), TransportError> {
        let pending = self.pending.as_ref().ok_or(TransportError::NotOpen)?;
        let due = Instant::now() + self.ack_delay;

        // All lines of one reply share a due time; the pump keeps their order.
        for reply in self.machine.respond(line).into_lines() {
            trace!(command = line, %reply, "simulated reply scheduled");
            pending
                .send((due, reply))
                .await
                .map_err(|_| TransportError::Closed)?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.pending = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
