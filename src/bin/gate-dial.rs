use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use handshake_gate::{dial, IdentityKey, PublicKey};

#[derive(Parser)]
#[command(name = "gate-dial")]
#[command(about = "Run one authenticated handshake against a handshake-gate listener", long_about = None)]
struct Cli {
    /// Listener address (e.g., "127.0.0.1:2448").
    address: String,

    /// Listener's public key, hex encoded.
    #[arg(short, long)]
    remote_key: String,

    /// Our identity key file. A throwaway key is used when omitted.
    #[arg(short, long)]
    key: Option<PathBuf>,

    #[arg(short, long, default_value_t = 5_000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "handshake_gate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let remote = PublicKey::from_hex(&cli.remote_key)?;
    let local = match &cli.key {
        Some(path) => IdentityKey::load(path)?,
        None => IdentityKey::generate(),
    };
    let local_public = local.public_key();

    let conn = dial(local, remote, cli.address.as_str(), Duration::from_millis(cli.timeout_ms)).await?;

    println!("connected to {} as {}", conn.peer_addr(), local_public);
    println!("listener key verified: {}", conn.remote_static());
    Ok(())
}
