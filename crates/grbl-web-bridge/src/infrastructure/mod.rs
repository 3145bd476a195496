//! Infrastructure layer for grbl-web-bridge.
//!
//! All I/O lives here: the WebSocket listener, the controller transports,
//! the link supervisor and the config file.  [`serve`] wires them to the hub:
//!
//! ```text
//!   accept_loop ──HubEvent──▶ ┌─────┐ ──commands──▶ LinkSupervisor ──▶ Transport
//!   LinkSupervisor ─HubEvent─▶ │ hub │
//!                             └─────┘ ──frames──▶ per-client writer tasks
//! ```

use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use anyhow::Context;
use grbl_core::RuntimeState;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::application::hub::{BridgeHub, HubEvent};
use crate::domain::config::BridgeConfig;

pub mod config_file;
pub mod supervisor;
pub mod transport;
pub mod ws_server;

pub use supervisor::{LinkSupervisor, SupervisorConfig};
pub use transport::{Transport, TransportError};
pub use ws_server::accept_loop;

/// Capacity of the hub's event queue.
const HUB_QUEUE_DEPTH: usize = 1024;

/// Capacity of the queue of command lines waiting for the controller.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Binds `config.ws_bind_addr` and runs the bridge until `running` is
/// cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound (port in use, no
/// permission) or if the hub task panics.
pub async fn run_bridge(config: BridgeConfig, running: Arc<AtomicBool>) -> anyhow::Result<RuntimeState> {
    let listener = TcpListener::bind(config.ws_bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.ws_bind_addr))?;
    info!("WebSocket bridge listening on {}", config.ws_bind_addr);

    let transport = transport::from_config(&config);
    serve(listener, transport, config, running).await
}

/// Runs the bridge on an already-bound listener with the given transport.
///
/// Returns the final runtime state once the accept loop has stopped and the
/// hub has published its shutdown snapshot.
pub async fn serve(
    listener: TcpListener,
    transport: Box<dyn Transport>,
    config: BridgeConfig,
    running: Arc<AtomicBool>,
) -> anyhow::Result<RuntimeState> {
    let (hub_tx, hub_rx) = mpsc::channel(HUB_QUEUE_DEPTH);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

    // The label is replaced on connect if the supervisor falls back to the
    // simulator.
    let state = RuntimeState::new(transport.label(), config.air_override_force);
    let hub = tokio::spawn(BridgeHub::new(state, config.idle, command_tx).run(hub_rx));

    let supervisor = LinkSupervisor::new(transport, SupervisorConfig::from(&config));
    let mut supervisor = tokio::spawn(supervisor.run(command_rx, hub_tx.clone()));

    // Blocks until Ctrl+C clears `running`.
    accept_loop(listener, hub_tx.clone(), config.client_queue_depth, running).await;

    // The hub publishes the shutdown snapshot before returning; sessions
    // flush it as their outboxes close.

    if hub_tx.send(HubEvent::Shutdown).await.is_err() {
        warn!("hub already stopped");
    }
    let final_state = hub.await.context("hub task failed")?;

    // The hub dropped the command queue, so the supervisor winds down by
    // itself; don't wait on a pending reconnect or connect attempt.
    if tokio::time::timeout(Duration::from_secs(1), &mut supervisor).await.is_err() {
        warn!("link supervisor did not stop in time; aborting it");
        supervisor.abort();
    }
    Ok(final_state)
}
