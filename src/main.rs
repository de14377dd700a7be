//! handshake-gate
//!
//! Runs an authenticated listener and reports every peer that completes the
//! three-act handshake.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                   LISTENER                       │
//!   TCP connect       │  ┌────────────┐   token   ┌──────────────────┐  │
//!   ──────────────────┼─▶│ accept loop│──────────▶│ handshake task   │  │
//!                     │  └─────┬──────┘  (spawn)  │ act1 → act2 →    │  │
//!                     │        │                  │ act3 (deadlines) │  │
//!                     │   ┌────┴──────┐           └────────┬─────────┘  │
//!                     │   │token pool │◀── release ────────┤            │
//!                     │   └───────────┘                    ▼            │
//!   accept()          │                          ┌──────────────────┐  │
//!   ◀─────────────────┼──────────────────────────│ result handoff   │  │
//!                     │                          └──────────────────┘  │
//!                     │   shutdown signal: loop, tasks, handoff, accept │
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};

use handshake_gate::config::{load_config_or_default, GateConfig};
use handshake_gate::lifecycle::signals::shutdown_signal;
use handshake_gate::observability::{logging, metrics};
use handshake_gate::{IdentityKey, Listener};

#[derive(Parser)]
#[command(name = "handshake-gate")]
#[command(about = "Authenticated transport listener", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept authenticated connections (default)
    Serve,
    /// Generate an identity key file and print its public key
    Keygen {
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Keygen { out } => keygen(&out),
        Commands::Serve => serve(cli.config.as_deref()).await,
    }
}

fn keygen(out: &Path) -> Result<(), Box<dyn Error>> {
    let key = IdentityKey::generate();
    key.save(out)?;
    println!("{}", key.public_key());
    Ok(())
}

async fn serve(config_path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let config = load_config_or_default(config_path)?;
    logging::init_logging(&config.observability)?;

    tracing::info!("handshake-gate v{} starting", env!("CARGO_PKG_VERSION"));

    let identity = load_identity(&config)?;

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse::<SocketAddr>()?;
        metrics::init_metrics(addr)?;
    }

    let listener = Listener::bind_with_config(identity, &config.listener).await?;
    tracing::info!(
        address = %listener.local_addr(),
        public_key = %listener.public_key(),
        "Listening for authenticated connections"
    );

    let signal = shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            _ = &mut signal => break,
            result = listener.accept() => match result {
                Ok(conn) => {
                    tracing::info!(
                        connection_id = %conn.id(),
                        peer = %conn.peer_addr(),
                        remote_static = %conn.remote_static(),
                        "Peer authenticated"
                    );
                }
                Err(e) if e.is_closed() => break,
                Err(e) => {
                    tracing::warn!(error = %e, kind = ?e.kind(), "Handshake failed");
                }
            },
        }
    }

    listener.close()?;

    // Tasks abort at their next checkpoint; the deadline is the worst case.
    let drain_limit = config.listener.handshake_timeout() + Duration::from_secs(1);
    if tokio::time::timeout(drain_limit, listener.wait_drained()).await.is_err() {
        tracing::warn!(
            available_tokens = listener.available_tokens(),
            capacity = listener.capacity(),
            "Timed out waiting for in-flight handshakes"
        );
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn load_identity(config: &GateConfig) -> Result<IdentityKey, Box<dyn Error>> {
    match &config.identity.key_path {
        Some(path) => {
            let key = IdentityKey::load(Path::new(path))?;
            tracing::info!(path = %path, "Identity key loaded");
            Ok(key)
        }
        None => {
            tracing::warn!("No identity.key_path configured, using an ephemeral identity key");
            Ok(IdentityKey::generate())
        }
    }
}
