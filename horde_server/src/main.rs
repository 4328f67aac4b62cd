//! Standalone feed server binary.
//!
//! Usage:
//!   cargo run -p horde_server -- [--addr 127.0.0.1:40000] [--config horde.json]
//!                                [--tick-hz 10]
//!
//! The server simulates the zombie world and streams every row change to the
//! connected clients.

use std::env;
use std::path::Path;

use anyhow::Context;
use horde_server::FeedServer;
use horde_shared::config::HordeConfig;
use tracing::info;

fn parse_args() -> anyhow::Result<HordeConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => HordeConfig::load(Path::new(&args[i + 1]))?,
        _ => HordeConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().context("parse --tick-hz")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.server_addr, module = %cfg.module, tick_hz = cfg.tick_hz, "Starting feed server");

    let mut server = FeedServer::bind(cfg).await.context("bind")?;
    info!(addr = %server.local_addr()?, "Listening");

    server.run().await
}
