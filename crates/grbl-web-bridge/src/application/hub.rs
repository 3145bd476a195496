//! The hub: single owner of the runtime state.
//!
//! Everything that can change what the bridge knows about the machine is
//! funnelled into one task as a [`HubEvent`]:
//!
//! ```text
//!  ws session ──ClientJoined/ClientLeft/ClientCommand──┐
//!  ws session ──────────────────────────────────────────┤
//!  link supervisor ──Link(Connecting/Connected/Lost/Line)┤──▶ BridgeHub ──▶ Broadcaster ──▶ clients
//!                                                       │        │
//!                          idle deadline (timer) ───────┘        └──▶ controller queue ──▶ supervisor
//! ```
//!
//! Because only this task touches [`RuntimeState`], [`StreamTracker`] and the
//! [`Broadcaster`], mutations are naturally serialised: each event is fully
//! applied (and its snapshot broadcast) before the next one is looked at, and
//! every client sees the same sequence of frames.
//!
//! The event handlers are synchronous and take the current time as an
//! argument, so the whole state machine can be driven from plain `#[test]`
//! functions.  [`BridgeHub::run`] is the thin async loop around them.

use std::time::Instant as StdInstant;

use grbl_core::protocol::{air_assist_change, NOT_CONNECTED_NOTICE};
use grbl_core::{
    classify_response, parse_status_report, IdleTimeouts, MachineStatus, Response, RuntimeState,
    StreamTracker, StreamTransition,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::application::broadcaster::{Broadcaster, Delivery};
use crate::domain::messages::{ClientFrame, ClientId, LinkEvent};

/// Notice broadcast when the controller queue cannot take another line.
pub const BUSY_NOTICE: &str = "ERROR: Bridge busy, command dropped";

/// Input to the hub task.
#[derive(Debug)]
pub enum HubEvent {
    /// A WebSocket session finished its handshake.  `outbox` is the sending
    /// half of the session's outbound queue.
    ClientJoined {
        id: ClientId,
        outbox: mpsc::Sender<ClientFrame>,
    },
    /// A WebSocket session ended.
    ClientLeft { id: ClientId },
    /// One command line received from a client.
    ClientCommand { id: ClientId, line: String },
    /// Something happened on the controller link.
    Link(LinkEvent),
    /// Stop the hub after publishing a final snapshot.
    Shutdown,
}

/// Counters kept by the hub, mostly for tests and the shutdown log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Runtime-state snapshots published (to all clients, even if there were
    /// none at the time).
    pub state_broadcasts: u64,
    /// Controller lines relayed to clients.
    pub lines_relayed: u64,
    /// Client commands handed to the controller queue.
    pub commands_forwarded: u64,
    /// Client commands refused (link down or queue full).
    pub commands_rejected: u64,
    /// Clients dropped because their queue was full or closed.
    pub clients_evicted: u64,
}

/// Owns the runtime state and reacts to [`HubEvent`]s.
#[derive(Debug)]
pub struct BridgeHub {
    state: RuntimeState,
    clients: Broadcaster,
    stream: StreamTracker,
    link_up: bool,
    controller: mpsc::Sender<String>,
    stats: HubStats,
}

impl BridgeHub {
    /// Creates a hub.  `controller` is the queue drained by the link
    /// supervisor; lines pushed there are written to the controller in order.
    pub fn new(state: RuntimeState, idle: IdleTimeouts, controller: mpsc::Sender<String>) -> Self {
        Self {
            state,
            clients: Broadcaster::new(),
            stream: StreamTracker::new(idle),
            link_up: false,
            controller,
            stats: HubStats::default(),
        }
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    pub fn stats(&self) -> HubStats {
        self.stats
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    /// When streaming will end if nothing else happens.
    pub fn idle_deadline(&self) -> Option<StdInstant> {
        self.stream.deadline()
    }

    /// Runs the hub until [`HubEvent::Shutdown`] arrives or every sender is
    /// dropped, then publishes the shutdown snapshot and returns the final
    /// state.
    ///
    /// Time is read from `tokio::time`, so tests running with a paused clock
    /// control the idle timeout.
    pub async fn run(mut self, mut events: mpsc::Receiver<HubEvent>) -> RuntimeState {
        info!(device = %self.state.serial_device, "hub started");

        loop {
            let deadline = self.stream.deadline().map(Instant::from_std);

            tokio::select! {
                event = events.recv() => match event {
                    Some(HubEvent::Shutdown) | None => break,
                    Some(event) => self.handle(event, Instant::now().into_std()),
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_idle_deadline(Instant::now().into_std());
                }
            }
        }

        self.shutdown();
        info!(
            snapshots = self.stats.state_broadcasts,
            lines = self.stats.lines_relayed,
            forwarded = self.stats.commands_forwarded,
            rejected = self.stats.commands_rejected,
            evicted = self.stats.clients_evicted,
            "hub stopped"
        );
        self.state
    }

    /// Applies one event.
    pub fn handle(&mut self, event: HubEvent, now: StdInstant) {
        match event {
            HubEvent::ClientJoined { id, outbox } => self.on_client_joined(id, outbox),
            HubEvent::ClientLeft { id } => self.on_client_left(id),
            HubEvent::ClientCommand { id, line } => self.on_client_command(id, &line, now),
            HubEvent::Link(link) => self.on_link_event(link, now),
            HubEvent::Shutdown => self.shutdown(),
        }
    }

    /// Ends streaming if the idle deadline has passed.
    pub fn on_idle_deadline(&mut self, now: StdInstant) {
        if let Some(transition) = self.stream.poll_expired(now) {
            self.apply_stream_transition(transition);
            self.publish_state();
        }
    }

    /// Forces streaming off, marks clients and air assist off, and publishes
    /// the result.
    pub fn shutdown(&mut self) {
        self.stream.force_idle();
        self.link_up = false;
        self.state.streaming = false;
        self.state.client_connected = false;
        self.state.air_state = false;
        info!("air assist off for shutdown");
        self.publish_state();
    }

    // ── Clients ───────────────────────────────────────────────────────────────

    fn on_client_joined(&mut self, id: ClientId, outbox: mpsc::Sender<ClientFrame>) {
        self.clients.register(id, outbox);
        info!(client = %id, clients = self.clients.len(), "client connected");

        if !self.state.client_connected {
            self.state.client_connected = true;
            self.publish_state();
        } else if let Some(frame) = self.snapshot_frame() {
            // Nothing changed for the others; only the newcomer needs a copy.
            if self.clients.send_to(id, frame) == Delivery::Evicted {
                self.stats.clients_evicted += 1;
                self.after_eviction();
            }
        }
    }

    fn on_client_left(&mut self, id: ClientId) {
        let was_member = self.clients.contains(id);
        let now_empty = self.clients.unregister(id);
        if was_member {
            info!(client = %id, clients = self.clients.len(), "client disconnected");
        }
        if now_empty {
            self.mark_no_clients();
        }
    }

    fn mark_no_clients(&mut self) {
        if self.state.client_connected {
            self.state.client_connected = false;
            self.publish_state();
        }
    }

    fn after_eviction(&mut self) {
        if self.clients.is_empty() {
            self.mark_no_clients();
        }
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    fn on_client_command(&mut self, id: ClientId, line: &str, now: StdInstant) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        // An evicted session's reader may still have lines in flight.
        if !self.clients.contains(id) {
            debug!(client = %id, command = line, "dropping command from departed client");
            return;
        }

        if !self.link_up {
            self.reject(id, line, NOT_CONNECTED_NOTICE);
            return;
        }

        // Claim the queue slot first: a command that cannot be queued must
        // leave streaming and air assist as they were.
        let permit = match self.controller.clone().try_reserve_owned() {
            Ok(permit) => permit,
            Err(TrySendError::Full(_)) => {
                self.reject(id, line, BUSY_NOTICE);
                return;
            }
            Err(TrySendError::Closed(_)) => {
                self.link_up = false;
                self.reject(id, line, NOT_CONNECTED_NOTICE);
                return;
            }
        };

        let mut changed = false;
        if let Some(transition) = self.stream.on_client_command(line, now) {
            self.apply_stream_transition(transition);
            changed = true;
        }
        if let Some(on) = air_assist_change(line) {
            changed |= self.set_air(on, line);
        }
        if changed {
            self.publish_state();
        }

        permit.send(line.to_string());
        self.stats.commands_forwarded += 1;
        trace!(client = %id, command = line, "forwarded to controller");
    }

    fn reject(&mut self, id: ClientId, line: &str, notice: &str) {
        self.stats.commands_rejected += 1;
        warn!(client = %id, command = line, notice, "command not forwarded");
        self.fan_out(&ClientFrame::notice(notice));
    }

    fn apply_stream_transition(&mut self, transition: StreamTransition) {
        self.state.streaming = transition.is_streaming();
        match transition {
            StreamTransition::Started => info!("streaming started"),
            StreamTransition::Ended => info!("streaming ended"),
        }
        let source = match transition {
            StreamTransition::Started => "stream start",
            StreamTransition::Ended => "stream end",
        };
        self.set_air(false, source);
    }

    /// Returns `true` if `air_state` changed.
    fn set_air(&mut self, on: bool, source: &str) -> bool {
        if self.state.air_override_force || self.state.air_state == on {
            return false;
        }
        self.state.air_state = on;
        info!(source, "air assist {}", if on { "on" } else { "off" });
        true
    }

    // ── Controller link ───────────────────────────────────────────────────────

    fn on_link_event(&mut self, event: LinkEvent, now: StdInstant) {
        match event {
            LinkEvent::Connecting => {
                self.link_up = false;
                self.set_status(MachineStatus::Connecting);
            }
            LinkEvent::Connected { label } => {
                info!(device = %label, "controller link up");
                self.link_up = true;
                self.state.serial_device = label;
                self.state.status = MachineStatus::Idle;
                self.publish_state();
            }
            LinkEvent::Lost { reason } => {
                if self.link_up {
                    warn!(%reason, "controller link lost");
                } else {
                    debug!(%reason, "controller link still down");
                }
                self.link_up = false;
                self.set_status(MachineStatus::Disconnected);
            }
            LinkEvent::Line(line) => self.on_controller_line(line, now),
        }
    }

    fn on_controller_line(&mut self, line: String, now: StdInstant) {
        // Raw relay first; the parsed snapshot follows.
        self.stats.lines_relayed += 1;
        let kind = classify_response(&line);
        self.fan_out(&ClientFrame::line(line.as_str()));

        match kind {
            Response::Ok => self.stream.on_transport_ok(now),
            Response::StatusReport => match parse_status_report(&line) {
                Ok(report) => {
                    self.state.apply_report(&report);
                    self.publish_state();
                }
                Err(err) => debug!(%err, %line, "ignoring malformed status report"),
            },
            Response::Alarm(code) => warn!(code, "controller alarm"),
            Response::Error(code) => debug!(code, "controller rejected a command"),
            Response::Other => trace!(%line, "controller message"),
        }
    }

    fn set_status(&mut self, status: MachineStatus) {
        if self.state.status != status {
            self.state.status = status;
            self.publish_state();
        }
    }

    // ── Fan-out ───────────────────────────────────────────────────────────────

    fn snapshot_frame(&self) -> Option<ClientFrame> {
        match serde_json::to_string(&self.state) {
            Ok(json) => Some(ClientFrame::state(json)),
            Err(err) => {
                error!(%err, "failed to serialise runtime state");
                None
            }
        }
    }

    fn publish_state(&mut self) {
        self.stats.state_broadcasts += 1;
        if let Some(frame) = self.snapshot_frame() {
            self.fan_out(&frame);
        }
    }

    fn fan_out(&mut self, frame: &ClientFrame) {
        let report = self.clients.broadcast(frame);
        trace!(kind = frame.kind(), delivered = report.delivered, "broadcast");
        if !report.evicted.is_empty() {
            self.stats.clients_evicted += report.evicted.len() as u64;
            self.after_eviction();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
