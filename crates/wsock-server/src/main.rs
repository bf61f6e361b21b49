//! wsock echo server: entry point.
//!
//! Accepts WebSocket connections and answers every message with
//! `server received: <message>` on the same connection.
//!
//! # Usage
//!
//! ```text
//! wsock-server [OPTIONS]
//!
//! Options:
//!   --port <PORT>         TCP port to listen on [default: 8080]
//!   --bind <ADDR>         Interface to bind [default: 0.0.0.0]
//!   --config <FILE>       TOML configuration file
//!   --max-payload <BYTES> Largest accepted frame payload [default: 16 MiB]
//! ```
//!
//! # Configuration sources
//!
//! Values are resolved in this order, later sources winning:
//!
//! 1. Built-in defaults ([`ServerConfig::default`])
//! 2. The TOML file given by `--config` / `WSOCK_CONFIG`
//! 3. Command-line flags and their environment variables
//!
//! | Variable       | Flag       |
//! |----------------|------------|
//! | `WSOCK_PORT`   | `--port`   |
//! | `WSOCK_BIND`   | `--bind`   |
//! | `WSOCK_CONFIG` | `--config` |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use wsock_server::{ConnectionId, ServerConfig, WebSocketServer};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Minimal WebSocket echo server.
#[derive(Debug, Parser)]
#[command(name = "wsock-server", about = "Minimal WebSocket echo server", version)]
struct Cli {
    /// TCP port to listen on.  Overrides the config file.
    #[arg(long, env = "WSOCK_PORT")]
    port: Option<u16>,

    /// IP address to bind.  `0.0.0.0` listens on every interface.
    #[arg(long, env = "WSOCK_BIND")]
    bind: Option<IpAddr>,

    /// Optional TOML configuration file.
    #[arg(long, env = "WSOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Largest payload, in bytes, a single incoming frame may carry.
    #[arg(long)]
    max_payload: Option<u64>,
}

impl Cli {
    /// Builds the effective [`ServerConfig`]: file (or defaults), then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(max_payload) = self.max_payload {
            config.max_payload = max_payload;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;
    info!(
        "wsock server starting on {} (max payload {} bytes)",
        config.socket_addr(),
        config.max_payload
    );

    let server = Arc::new(WebSocketServer::new(config));

    let replies = server.registry().clone();
    server.on_message(move |id: ConnectionId, message: &str| {
        debug!(%id, "received: {message}");
        replies.send(id, &format!("server received: {message}"));
    });

    // Ctrl+C (SIGINT) stops the accept loop and closes live sessions.
    let stopper = Arc::clone(&server);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                stopper.stop();
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    server.start().await.context("WebSocket server failed")?;

    info!("wsock server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
