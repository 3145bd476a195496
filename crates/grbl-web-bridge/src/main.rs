//! GRBL WebSocket bridge: entry point.
//!
//! Owns the link to one GRBL-style CNC/laser controller (serial, TCP or
//! simulated) and shares it with any number of browser dashboards over
//! WebSocket.
//!
//! # Usage
//!
//! ```text
//! grbl-web-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>         TOML config file
//!   --ws-bind <IP>          WebSocket bind address       [default: 0.0.0.0]
//!   --ws-port <PORT>        WebSocket port               [default: 5000]
//!   --mode <MODE>           serial | tcp | simulated     [default: serial]
//!   --device <PATH>         Serial device                [default: /dev/ttyUSB0]
//!   --baud <RATE>           Serial baud rate             [default: 115200]
//!   --tcp-host <HOST>       GRBL TCP endpoint host       [default: 127.0.0.1]
//!   --tcp-port <PORT>       GRBL TCP endpoint port       [default: 3333]
//!   --air-override-force    Never change air assist automatically
//! ```
//!
//! # Precedence
//!
//! Built-in defaults, then the `--config` file, then environment variables,
//! then command-line flags.
//!
//! | Variable             | Flag                   |
//! |----------------------|------------------------|
//! | `BRIDGE_CONFIG`      | `--config`             |
//! | `BRIDGE_WS_BIND`     | `--ws-bind`            |
//! | `BRIDGE_WS_PORT`     | `--ws-port`            |
//! | `BRIDGE_MODE`        | `--mode`               |
//! | `SERIAL_DEVICE`      | `--device`             |
//! | `SERIAL_BAUD`        | `--baud`               |
//! | `LIGHTBURN_TCP_HOST` | `--tcp-host`           |
//! | `LIGHTBURN_TCP_PORT` | `--tcp-port`           |
//! | `AIR_OVERRIDE_FORCE` | `--air-override-force` |
//!
//! The log filter comes from `RUST_LOG`, or the config file's `log_level`,
//! or `info`.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use grbl_web_bridge::domain::{BridgeConfig, BridgeMode};
use grbl_web_bridge::infrastructure::config_file::FileConfig;
use grbl_web_bridge::infrastructure::run_bridge;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// GRBL controller to WebSocket bridge.
///
/// Every option is optional; unset options fall back to the config file and
/// then to the built-in defaults.
#[derive(Debug, Default, Parser)]
#[command(
    name = "grbl-web-bridge",
    about = "Share one GRBL CNC/laser controller with many WebSocket dashboards",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// IP address for the WebSocket server (`0.0.0.0` for all interfaces).
    #[arg(long, env = "BRIDGE_WS_BIND")]
    ws_bind: Option<String>,

    /// TCP port for the WebSocket server.
    #[arg(long, env = "BRIDGE_WS_PORT")]
    ws_port: Option<u16>,

    /// Controller link: `serial`, `tcp` or `simulated`.
    #[arg(long, env = "BRIDGE_MODE")]
    mode: Option<BridgeMode>,

    /// Serial device path.
    #[arg(long = "device", env = "SERIAL_DEVICE")]
    serial_device: Option<String>,

    /// Serial baud rate.
    #[arg(long = "baud", env = "SERIAL_BAUD")]
    baud_rate: Option<u32>,

    /// Host of the GRBL TCP endpoint (LightBurn bridge or networked controller).
    #[arg(long, env = "LIGHTBURN_TCP_HOST")]
    tcp_host: Option<String>,

    /// Port of the GRBL TCP endpoint.
    #[arg(long, env = "LIGHTBURN_TCP_PORT")]
    tcp_port: Option<u16>,

    /// Leave air assist under manual control.
    #[arg(long, env = "AIR_OVERRIDE_FORCE", action = ArgAction::SetTrue)]
    air_override_force: bool,
}

impl Cli {
    /// Merges the config file (if any) and the CLI overrides.
    ///
    /// Returns the bridge configuration and the fallback log filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// the resulting settings are invalid (e.g. `--ws-bind` is not an IP
    /// address).
    fn into_settings(self) -> anyhow::Result<(BridgeConfig, String)> {
        let mut file = match &self.config {
            Some(path) => FileConfig::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => FileConfig::default(),
        };

        if let Some(ws_bind) = self.ws_bind {
            file.bridge.ws_bind = ws_bind;
        }
        if let Some(ws_port) = self.ws_port {
            file.bridge.ws_port = ws_port;
        }
        if let Some(mode) = self.mode {
            file.bridge.mode = mode;
        }
        if let Some(device) = self.serial_device {
            file.grbl.device = device;
        }
        if let Some(baud_rate) = self.baud_rate {
            file.grbl.baud_rate = baud_rate;
        }
        if let Some(tcp_host) = self.tcp_host {
            file.grbl.tcp_host = tcp_host;
        }
        if let Some(tcp_port) = self.tcp_port {
            file.grbl.tcp_port = tcp_port;
        }
        if self.air_override_force {
            file.air.override_force = true;
        }

        let log_level = file.bridge.log_level.clone();
        let config = file.into_bridge_config().context("invalid bridge configuration")?;
        Ok((config, log_level))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, log_level) = Cli::parse().into_settings()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    info!(
        mode = %config.mode,
        link = %config.link_label(),
        ws = %config.ws_bind_addr,
        air_override_force = config.air_override_force,
        "GRBL WebSocket bridge starting"
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let final_state = run_bridge(config, running).await?;

    info!(status = %final_state.status, "GRBL WebSocket bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
