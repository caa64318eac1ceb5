//! Civitas Server - hosts room runtimes behind a JSON-lines stdio protocol.
//!
//! Commands are read from stdin, one JSON object per line (see [`protocol`]).
//! Replies and room events are written to stdout as JSON lines; logs go to
//! stderr so they never interleave with the protocol.

use anyhow::{Context, Result};
use civitas_core::EngineConfig;
use civitas_env::{ChannelTransport, TokioContext};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod protocol;
mod registry;

use protocol::{ClientCommand, ServerMessage, PROTOCOL_VERSION};
use registry::RoomRegistry;

#[derive(Parser, Debug)]
#[command(name = "civitas-server")]
#[command(about = "Authoritative multiplayer city-building room server", long_about = None)]
struct Args {
    /// Engine config file (JSON); defaults apply to anything it omits
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the economy tick interval (ms)
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Override the coordinate lock TTL (ms)
    #[arg(long)]
    lock_ttl_ms: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_path(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(tick_ms) = args.tick_ms {
        config.tick_interval_ms = tick_ms;
    }
    if let Some(ttl) = args.lock_ttl_ms {
        config.lock_ttl_ms = ttl;
    }
    config.validate().context("invalid engine config")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    info!(
        tick_ms = config.tick_interval_ms,
        lock_ttl_ms = config.lock_ttl_ms,
        max_players = config.max_players,
        "Civitas server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // Single writer so replies and events never interleave mid-line.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = out_rx.recv().await {
            let mut line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Failed to encode message");
                    continue;
                }
            };
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let (transport, mut events) = ChannelTransport::new();
    let event_tx = out_tx.clone();
    tokio::spawn(async move {
        while let Some(envelope) = events.recv().await {
            if event_tx.send(ServerMessage::from_envelope(envelope)).is_err() {
                break;
            }
        }
    });

    let mut registry = RoomRegistry::new(Arc::new(config), TokioContext::shared(), Arc::new(transport));
    out_tx.send(ServerMessage::Ready {
        protocol_version: PROTOCOL_VERSION,
    })?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<ClientCommand>(&line) {
            Ok(command) => registry.dispatch(command).await,
            Err(e) => ServerMessage::error(format!("Parse error: {}", e)),
        };
        let goodbye = matches!(reply, ServerMessage::Goodbye);
        out_tx.send(reply)?;
        if goodbye {
            break;
        }
    }

    info!("Shutting down");
    registry.shutdown_all();
    drop(registry);
    drop(out_tx);

    // Rooms flush their last events before stopping; give the writer a moment to drain.
    if tokio::time::timeout(Duration::from_secs(2), writer).await.is_err() {
        warn!("Writer did not drain in time");
    }
    Ok(())
}
