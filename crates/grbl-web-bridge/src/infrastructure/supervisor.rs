//! Controller link supervision.
//!
//! The supervisor owns the [`Transport`] and keeps it open for the lifetime
//! of the bridge:
//!
//! ```text
//!   ┌────────────┐ open ok  ┌───────────┐ EOF / write error ┌──────────────┐
//!   │ Connecting │ ───────▶ │ Connected │ ────────────────▶ │ Disconnected │
//!   └────────────┘          └───────────┘                   └──────────────┘
//!         ▲  │ open failed                                          │
//!         │  └──────────────────────────────────────────────────────┤
//!         └──────────────────── after `backoff` ────────────────────┘
//! ```
//!
//! Every transition is reported to the hub as a [`LinkEvent`].  While
//! connected, the supervisor pumps lines in both directions: controller
//! lines go to the hub, and command lines queued by the hub are written to
//! the transport in order.
//!
//! A serial device that cannot be opened on the very first attempt is
//! replaced by the simulated controller, so the bridge is usable on a
//! machine with nothing plugged in.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

use crate::application::hub::HubEvent;
use crate::domain::config::{BridgeConfig, BridgeMode};
use crate::domain::messages::LinkEvent;
use crate::infrastructure::transport::{SimulatedTransport, Transport};

/// Supervisor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Fixed wait between a failure and the next open attempt.
    pub backoff: Duration,
    /// Replace a serial transport with the simulator if the first open fails.
    pub fallback_to_simulated: bool,
    /// Ack delay of the fallback simulator.
    pub sim_ack_delay: Duration,
}

impl From<&BridgeConfig> for SupervisorConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            backoff: config.reconnect_backoff,
            fallback_to_simulated: true,
            sim_ack_delay: config.sim_ack_delay,
        }
    }
}

/// Why the pump loop stopped.
enum PumpExit {
    LinkLost(String),
    Shutdown,
}

/// Keeps one controller link alive and relays its traffic.
pub struct LinkSupervisor {
    transport: Box<dyn Transport>,
    config: SupervisorConfig,
}

impl LinkSupervisor {
    pub fn new(transport: Box<dyn Transport>, config: SupervisorConfig) -> Self {
        Self { transport, config }
    }

    /// Runs until the hub goes away or `commands` is closed.
    ///
    /// `commands` carries the lines the hub wants written to the controller.
    pub async fn run(mut self, mut commands: mpsc::Receiver<String>, hub: mpsc::Sender<HubEvent>) {
        let mut first_attempt = true;

        loop {
            if !report(&hub, LinkEvent::Connecting).await {
                break;
            }

            match self.transport.open().await {
                Ok(lines) => {
                    // Fallback only applies to a device that was never seen.
                    first_attempt = false;
                    let label = self.transport.label();
                    info!(device = %label, "controller link established");
                    if !report(&hub, LinkEvent::Connected { label }).await {
                        break;
                    }

                    match self.pump(lines, &mut commands, &hub).await {
                        PumpExit::Shutdown => break,
                        PumpExit::LinkLost(reason) => {
                            // Release the port before the next open.
                            self.transport.close().await;
                            warn!(
                                device = %self.transport.label(),
                                %reason,
                                "controller link lost; reconnecting in {:?}",
                                self.config.backoff
                            );
                            if !report(&hub, LinkEvent::Lost { reason }).await {
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    if std::mem::take(&mut first_attempt)
                        && self.config.fallback_to_simulated
                        && self.transport.mode() == BridgeMode::Serial
                    {
                        warn!(
                            device = %self.transport.label(),
                            %err,
                            "serial device unavailable; using the simulated controller"
                        );
                        self.transport = Box::new(SimulatedTransport::new(self.config.sim_ack_delay));
                        // Open the simulator right away, without a backoff.
                        continue;
                    }

                    warn!(device = %self.transport.label(), %err, "could not open controller link");
                    if !report(&hub, LinkEvent::Lost { reason: err.to_string() }).await {
                        break;
                    }
                }
            }

            if !self.wait_backoff(&mut commands).await {
                break;
            }
        }

        self.transport.close().await;
        debug!("link supervisor stopped");
    }

    /// Relays traffic until the link drops or the bridge shuts down.
    async fn pump(
        &mut self,
        mut lines: mpsc::Receiver<String>,
        commands: &mut mpsc::Receiver<String>,
        hub: &mpsc::Sender<HubEvent>,
    ) -> PumpExit {
        loop {
            tokio::select! {
                line = lines.recv() => match line {
                    Some(line) => {
                        if !report(hub, LinkEvent::Line(line)).await {
                            return PumpExit::Shutdown;
                        }
                    }
                    None => return PumpExit::LinkLost("connection closed".to_string()),
                },
                // `None` here means the hub dropped its sender: shutdown.
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Err(err) = self.transport.write(&command).await {
                            return PumpExit::LinkLost(err.to_string());
                        }
                    }
                    None => return PumpExit::Shutdown,
                },
            }
        }
    }

    /// Sleeps for the backoff period.  Commands that were queued before the
    /// hub learned about the failure are dropped, never replayed on the next
    /// link.  Returns `false` if the bridge is shutting down.
    async fn wait_backoff(&mut self, commands: &mut mpsc::Receiver<String>) -> bool {
        let sleep = time::sleep(self.config.backoff);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = commands.recv() => match command {
                    Some(command) => debug!(%command, "dropping command queued while link down"),
                    None => return false,
                },
            }
        }
    }
}

/// Sends a link event to the hub.  Returns `false` once the hub is gone.
async fn report(hub: &mpsc::Sender<HubEvent>, event: LinkEvent) -> bool {
    hub.send(HubEvent::Link(event)).await.is_ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use super::*;
    use crate::infrastructure::transport::{MockTransport, TransportError};

    type OpenResult = Result<mpsc::Receiver<String>, TransportError>;

    /// A mock transport whose `open` calls return `script` in order.
    fn scripted(mode: BridgeMode, label: &str, script: Vec<OpenResult>) -> (MockTransport, Arc<Mutex<Vec<String>>>) {
        let script = Mutex::new(VecDeque::from(script));
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&written);

        let mut mock = MockTransport::new();
        mock.expect_mode().return_const(mode);
        mock.expect_label().return_const(label.to_string());
        mock.expect_open().returning(move || {
            script
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected open attempt")
        });
        mock.expect_write().returning(move |line| {
            sink.lock().unwrap().push(line.to_string());
            Ok(())
        });
        mock.expect_close().returning(|| ());
        (mock, written)
    }

    fn unavailable() -> OpenResult {
        Err(TransportError::Unavailable {
            target: "x".into(),
            reason: "refused".into(),
        })
    }

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            backoff: Duration::from_secs(1),
            fallback_to_simulated: true,
            sim_ack_delay: Duration::from_millis(30),
        }
    }

    async fn next_link(rx: &mut mpsc::Receiver<HubEvent>) -> LinkEvent {
        match rx.recv().await.expect("supervisor alive") {
            HubEvent::Link(event) => event,
            other => panic!("unexpected hub event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lines_and_commands_are_relayed() {
        // Arrange
        let (line_tx, line_rx) = mpsc::channel(8);
        let (mock, written) = scripted(BridgeMode::Tcp, "tcp:h:1", vec![Ok(line_rx)]);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (hub_tx, mut hub_rx) = mpsc::channel(8);
        let task = tokio::spawn(LinkSupervisor::new(Box::new(mock), config()).run(cmd_rx, hub_tx));

        assert_eq!(next_link(&mut hub_rx).await, LinkEvent::Connecting);
        assert_eq!(
            next_link(&mut hub_rx).await,
            LinkEvent::Connected {
                label: "tcp:h:1".into()
            }
        );

        // Act
        line_tx.send("ok".into()).await.unwrap();
        cmd_tx.send("G0 X1".into()).await.unwrap();
        cmd_tx.send("G0 X2".into()).await.unwrap();

        // Assert
        assert_eq!(next_link(&mut hub_rx).await, LinkEvent::Line("ok".into()));
        drop(cmd_tx);
        task.await.unwrap();
        assert_eq!(*written.lock().unwrap(), vec!["G0 X1", "G0 X2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_backoff() {
        // Arrange
        let (first_tx, first_rx) = mpsc::channel(8);
        let (_second_tx, second_rx) = mpsc::channel(8);
        let (mock, _) = scripted(BridgeMode::Tcp, "tcp:h:1", vec![Ok(first_rx), Ok(second_rx)]);
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (hub_tx, mut hub_rx) = mpsc::channel(8);
        tokio::spawn(LinkSupervisor::new(Box::new(mock), config()).run(cmd_rx, hub_tx));
        next_link(&mut hub_rx).await;
        next_link(&mut hub_rx).await;

        // Act: the peer goes away
        drop(first_tx);

        // Assert
        assert!(matches!(next_link(&mut hub_rx).await, LinkEvent::Lost { .. }));
        let lost_at = Instant::now();
        assert_eq!(next_link(&mut hub_rx).await, LinkEvent::Connecting);
        assert!(matches!(next_link(&mut hub_rx).await, LinkEvent::Connected { .. }));
        assert!(lost_at.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_open_retries_without_fallback_for_tcp() {
        let (_line_tx, line_rx) = mpsc::channel(8);
        let (mock, _) = scripted(BridgeMode::Tcp, "tcp:h:1", vec![unavailable(), Ok(line_rx)]);
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (hub_tx, mut hub_rx) = mpsc::channel(8);
        tokio::spawn(LinkSupervisor::new(Box::new(mock), config()).run(cmd_rx, hub_tx));

        assert_eq!(next_link(&mut hub_rx).await, LinkEvent::Connecting);
        assert!(matches!(next_link(&mut hub_rx).await, LinkEvent::Lost { .. }));
        assert_eq!(next_link(&mut hub_rx).await, LinkEvent::Connecting);
        assert_eq!(
            next_link(&mut hub_rx).await,
            LinkEvent::Connected {
                label: "tcp:h:1".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_serial_device_falls_back_to_simulation() {
        // Arrange: the serial port never opens
        let (mock, _) = scripted(BridgeMode::Serial, "/dev/ttyUSB0", vec![unavailable()]);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (hub_tx, mut hub_rx) = mpsc::channel(8);
        tokio::spawn(LinkSupervisor::new(Box::new(mock), config()).run(cmd_rx, hub_tx));

        // Act
        let mut events = Vec::new();
        loop {
            let event = next_link(&mut hub_rx).await;
            let done = matches!(event, LinkEvent::Connected { .. });
            events.push(event);
            if done {
                break;
            }
        }

        // Assert: no Lost in between, and the simulator answers commands
        assert_eq!(
            events,
            vec![
                LinkEvent::Connecting,
                LinkEvent::Connecting,
                LinkEvent::Connected {
                    label: "simulated".into()
                },
            ]
        );
        cmd_tx.send("?".into()).await.unwrap();
        let LinkEvent::Line(reply) = next_link(&mut hub_rx).await else {
            panic!("expected a controller line");
        };
        assert!(reply.starts_with("<Idle|"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_serial_loss_after_connect_does_not_fall_back() {
        let (first_tx, first_rx) = mpsc::channel(8);
        let (_second_tx, second_rx) = mpsc::channel(8);
        let (mock, _) = scripted(
            BridgeMode::Serial,
            "/dev/ttyUSB0",
            vec![Ok(first_rx), unavailable(), Ok(second_rx)],
        );
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (hub_tx, mut hub_rx) = mpsc::channel(8);
        tokio::spawn(LinkSupervisor::new(Box::new(mock), config()).run(cmd_rx, hub_tx));
        next_link(&mut hub_rx).await;
        next_link(&mut hub_rx).await;

        drop(first_tx);

        assert!(matches!(next_link(&mut hub_rx).await, LinkEvent::Lost { .. }));
        assert_eq!(next_link(&mut hub_rx).await, LinkEvent::Connecting);
        assert!(matches!(next_link(&mut hub_rx).await, LinkEvent::Lost { .. }));
        assert_eq!(next_link(&mut hub_rx).await, LinkEvent::Connecting);
        assert_eq!(
            next_link(&mut hub_rx).await,
            LinkEvent::Connected {
                label: "/dev/ttyUSB0".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_during_backoff_are_dropped() {
        // Arrange
        let (first_tx, first_rx) = mpsc::channel(8);
        let (_second_tx, second_rx) = mpsc::channel(8);
        let (mock, written) = scripted(BridgeMode::Tcp, "tcp:h:1", vec![Ok(first_rx), Ok(second_rx)]);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (hub_tx, mut hub_rx) = mpsc::channel(8);
        tokio::spawn(LinkSupervisor::new(Box::new(mock), config()).run(cmd_rx, hub_tx));
        next_link(&mut hub_rx).await;
        next_link(&mut hub_rx).await;
        drop(first_tx);
        assert!(matches!(next_link(&mut hub_rx).await, LinkEvent::Lost { .. }));

        // Act: a command slips in while the link is down
        cmd_tx.send("G0 X9".into()).await.unwrap();
        assert_eq!(next_link(&mut hub_rx).await, LinkEvent::Connecting);
        assert!(matches!(next_link(&mut hub_rx).await, LinkEvent::Connected { .. }));

        // Assert
        assert!(written.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_hub_goes_away() {
        let (_line_tx, line_rx) = mpsc::channel(8);
        let (mock, _) = scripted(BridgeMode::Tcp, "tcp:h:1", vec![Ok(line_rx)]);
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (hub_tx, hub_rx) = mpsc::channel(8);
        drop(hub_rx);

        LinkSupervisor::new(Box::new(mock), config()).run(cmd_rx, hub_tx).await;
    }
}
