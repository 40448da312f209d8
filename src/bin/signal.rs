//! # Signal Server Binary
//!
//! Runs the rendezvous server that hosts register their codes with and
//! joiners look them up on.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin signal -- --config config/signal.toml
//! ```

use clap::Parser;
use log::info;

use peer_duel::common::config::{load_config, PeerConfig};
use peer_duel::signal::SignalServer;
use peer_duel::utils::init_logger;

/// Command-line arguments for the signal server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a configuration file (TOML format); only `[signal]` is used
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, overriding the configuration file
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config::<PeerConfig>(path)?.signal,
        None => Default::default(),
    };
    let listen = args.listen.unwrap_or(config.listen);

    let (addr, server) = SignalServer::new().start(&listen).await?;
    info!("Ready for hosts and joiners on {}", addr);

    tokio::select! {
        result = server => result?,
        _ = tokio::signal::ctrl_c() => info!("👋 Shutting down"),
    }

    Ok(())
}
