//! WebSocket server: accept loop and per-session tasks.
//!
//! Every accepted connection is upgraded to a WebSocket and registered with
//! the hub.  A session runs two tasks:
//!
//! - **reader**: text frames from the browser are split into command lines
//!   and sent to the hub as [`HubEvent::ClientCommand`].
//! - **writer**: frames queued for this client by the hub are written to the
//!   socket in order.
//!
//! The session ends when either task finishes, which happens when the browser
//! disconnects, when a write fails, or when the hub evicts the client (which
//! closes its queue).  The hub is then told the client left.
//!
//! Shutdown is driven by a shared `AtomicBool` set from the Ctrl+C handler
//! in `main.rs`; the accept loop polls it every 200 ms.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::hub::HubEvent;
use crate::domain::messages::{ClientFrame, ClientId};

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts WebSocket clients until `running` is cleared.
///
/// `queue_depth` is the capacity of each client's outbound queue.
pub async fn accept_loop(
    listener: TcpListener,
    hub: mpsc::Sender<HubEvent>,
    queue_depth: usize,
    running: Arc<AtomicBool>,
) {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }
        if hub.is_closed() {
            warn!("hub stopped; no longer accepting clients");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                // One task per connection; the handshake runs inside it so a
                // slow client cannot hold up the accept loop.
                debug!("new connection from {peer_addr}");
                let hub = hub.clone();
                tokio::spawn(async move {
                    handle_client_session(stream, peer_addr, hub, queue_depth).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {
                // Poll interval elapsed; loop back to re-check the flag.
            }
        }
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_client_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: mpsc::Sender<HubEvent>,
    queue_depth: usize,
) {
    match run_session(stream, peer_addr, hub, queue_depth).await {
        Ok(()) => debug!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: mpsc::Sender<HubEvent>,
    queue_depth: usize,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let id = ClientId::new();
    // Split so that reading and writing can proceed independently.
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (outbox, mut inbox) = mpsc::channel::<ClientFrame>(queue_depth);

    // The hub answers the join with the current snapshot on the outbox.
    hub.send(HubEvent::ClientJoined { id, outbox })
        .await
        .context("hub is not running")?;
    info!(client = %id, "WebSocket session established with {peer_addr}");

    // ── Writer: hub → browser ─────────────────────────────────────────────────
    // Ends when the hub drops the outbox (eviction or shutdown) or when the
    // browser stops accepting frames.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = inbox.recv().await {
            if ws_tx.send(WsMessage::Text(frame.text().to_string())).await.is_err() {
                debug!(client = %id, "WebSocket send failed (browser disconnected)");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // ── Reader: browser → hub ─────────────────────────────────────────────────
    // Each text frame may carry several lines; they go to the hub one event
    // per line so the hub sees the same order the browser sent.
    let reader_hub = hub.clone();
    let mut reader = tokio::spawn(async move {
        loop {
            let message = match ws_rx.next().await {
                Some(Ok(message)) => message,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!(client = %id, "WebSocket closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!(client = %id, "WebSocket error: {e}");
                    break;
                }
                None => break,
            };

            match message {
                WsMessage::Text(text) => {
                    for line in command_lines(&text) {
                        let event = HubEvent::ClientCommand {
                            id,
                            line: line.to_string(),
                        };
                        if reader_hub.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                WsMessage::Binary(_) => {
                    warn!(client = %id, "unexpected binary WebSocket frame (ignored)");
                }
                // tungstenite answers pings on its own.
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                WsMessage::Close(_) => {
                    debug!(client = %id, "WebSocket Close frame received");
                    break;
                }
            }
        }
    });

    // Whichever task stops first ends the session; the other one is aborted
    // so an evicted client cannot keep feeding commands to the controller.
    let first = stop_session_tasks(&mut writer, &mut reader).await;
    debug!(client = %id, "{first} task ended");

    info!(client = %id, "WebSocket session with {peer_addr} ended");
    // Ignored if the hub is already gone: there is nobody left to tell.
    let _ = hub.send(HubEvent::ClientLeft { id }).await;
    Ok(())
}

/// Waits for the writer or the reader to finish and aborts the other.
///
/// Returns which task finished first.
async fn stop_session_tasks(writer: &mut JoinHandle<()>, reader: &mut JoinHandle<()>) -> &'static str {
    tokio::select! {
        _ = &mut *writer => {
            reader.abort();
            "writer"
        }
        _ = &mut *reader => {
            writer.abort();
            "reader"
        }
    }
}

/// Splits a text frame into trimmed, non-empty command lines.
///
/// Dashboards normally send one command per frame, but macro buttons may
/// send several lines at once.
fn command_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
